//! In-memory party network for MPC simulations.
//!
//! Each party holds a [`PartyChannel`]: bounded senders to every peer and
//! its own receiver. Messages are round-tagged; a party gathering a round
//! buffers anything that arrives early for a later round. Dropping the
//! channel closes the party's mailbox, which is how cancellation
//! propagates.
use crate::error::ThresholdError;
use std::collections::VecDeque;
use tokio::sync::mpsc;

/// Bounded per-party mailbox capacity.
pub const CHANNEL_CAPACITY: usize = 64;

/// A round-tagged protocol message.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// Sending party index.
    pub from: usize,
    /// Receiving party index, `None` for broadcast.
    pub to: Option<usize>,
    /// Protocol round.
    pub round: u32,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

/// One party's endpoint in the network.
pub struct PartyChannel {
    /// This party's index.
    pub index: usize,
    senders: Vec<mpsc::Sender<Envelope>>,
    receiver: mpsc::Receiver<Envelope>,
    pending: VecDeque<Envelope>,
}

/// Builds a fully connected network of `n` parties.
pub fn build(n: usize) -> Vec<PartyChannel> {
    let mut senders = Vec::with_capacity(n);
    let mut receivers = Vec::with_capacity(n);
    for _ in 0..n {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        senders.push(tx);
        receivers.push(rx);
    }
    receivers
        .into_iter()
        .enumerate()
        .map(|(index, receiver)| PartyChannel {
            index,
            senders: senders.clone(),
            receiver,
            pending: VecDeque::new(),
        })
        .collect()
}

impl PartyChannel {
    /// Number of parties on the network.
    pub fn party_count(&self) -> usize {
        self.senders.len()
    }

    /// Broadcasts a payload to every other party.
    pub async fn broadcast(&self, round: u32, payload: Vec<u8>) -> Result<(), ThresholdError> {
        for (to, sender) in self.senders.iter().enumerate() {
            if to == self.index {
                continue;
            }
            let envelope = Envelope {
                from: self.index,
                to: None,
                round,
                payload: payload.clone(),
            };
            sender
                .send(envelope)
                .await
                .map_err(|_| ThresholdError::protocol("peer mailbox closed"))?;
        }
        Ok(())
    }

    /// Sends a payload to a single party.
    pub async fn send_to(
        &self,
        to: usize,
        round: u32,
        payload: Vec<u8>,
    ) -> Result<(), ThresholdError> {
        let envelope = Envelope {
            from: self.index,
            to: Some(to),
            round,
            payload,
        };
        self.senders
            .get(to)
            .ok_or(ThresholdError::InvalidPartyCount)?
            .send(envelope)
            .await
            .map_err(|_| ThresholdError::protocol("peer mailbox closed"))
    }

    /// Collects one message per peer for a round, buffering early arrivals
    /// from later rounds.
    pub async fn gather(&mut self, round: u32) -> Result<Vec<Envelope>, ThresholdError> {
        let expected = self.party_count() - 1;
        let mut collected: Vec<Envelope> = Vec::with_capacity(expected);

        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].round == round {
                let envelope = self.pending.remove(i).expect("index in bounds");
                collected.push(envelope);
            } else {
                i += 1;
            }
        }

        while collected.len() < expected {
            let envelope = self
                .receiver
                .recv()
                .await
                .ok_or_else(|| ThresholdError::protocol("network closed mid-round"))?;
            if envelope.round == round {
                collected.push(envelope);
            } else {
                self.pending.push_back(envelope);
            }
        }

        collected.sort_by_key(|e| e.from);
        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_peer() {
        let mut parties = build(3);
        let p2 = parties.pop().unwrap();
        let mut p1 = parties.pop().unwrap();
        let mut p0 = parties.pop().unwrap();

        p2.broadcast(1, vec![0xab]).await.unwrap();
        p0.broadcast(1, vec![0xcd]).await.unwrap();
        p1.broadcast(1, vec![0xef]).await.unwrap();

        let got0 = p0.gather(1).await.unwrap();
        assert_eq!(got0.len(), 2);
        assert_eq!(got0[0].from, 1);
        assert_eq!(got0[1].from, 2);

        let got1 = p1.gather(1).await.unwrap();
        assert_eq!(got1.iter().map(|e| e.from).collect::<Vec<_>>(), vec![0, 2]);
    }

    #[tokio::test]
    async fn early_rounds_are_buffered() {
        let mut parties = build(2);
        let p1 = parties.pop().unwrap();
        let mut p0 = parties.pop().unwrap();

        // round 2 lands before round 1
        p1.send_to(0, 2, vec![2]).await.unwrap();
        p1.send_to(0, 1, vec![1]).await.unwrap();

        let first = p0.gather(1).await.unwrap();
        assert_eq!(first[0].payload, vec![1]);
        let second = p0.gather(2).await.unwrap();
        assert_eq!(second[0].payload, vec![2]);
    }

    #[tokio::test]
    async fn dropped_peer_closes_the_round() {
        let mut parties = build(2);
        let p1 = parties.pop().unwrap();
        let mut p0 = parties.pop().unwrap();
        drop(p1);
        assert!(p0.gather(1).await.is_err());
    }
}
