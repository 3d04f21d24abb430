//! Threshold-key lifecycle manager.
//!
//! Request/complete bookkeeping for keygen, signing, refresh and reshare,
//! plus signer administration, quotas and expiry. The manager validates
//! everything before any heavy work; actually running a protocol is the
//! MPC client's job, wired in by the host between `request_*` and
//! `complete_*`.
use crate::{
    error::ThresholdError,
    protocols,
    types::{
        validate_threshold, KeyStatus, KeyType, KeygenRequest, Permissions, Protocol,
        RefreshRequest, RequestStatus, ReshareRequest, SignRequest, ThresholdKey,
        SECONDS_PER_DAY,
    },
};
use alloy_primitives::{keccak256, Address, Bytes, B256};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock,
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, info, warn};

/// Time source, injectable for quota and expiry tests.
pub trait Clock: Send + Sync {
    /// Current UTC seconds.
    fn now(&self) -> u64;
}

/// Wall-clock time.
#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before epoch")
            .as_secs()
    }
}

/// Default request lifetime in seconds.
pub const REQUEST_TTL: u64 = 3_600;

/// The lifecycle manager.
pub struct KeyManager {
    keys: RwLock<HashMap<B256, ThresholdKey>>,
    keygen_requests: RwLock<HashMap<B256, KeygenRequest>>,
    sign_requests: RwLock<HashMap<B256, SignRequest>>,
    refresh_requests: RwLock<HashMap<B256, RefreshRequest>>,
    reshare_requests: RwLock<HashMap<B256, ReshareRequest>>,
    request_counter: AtomicU64,
    clock: Box<dyn Clock>,
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new(Box::new(SystemClock))
    }
}

impl KeyManager {
    /// A manager over the given time source.
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            keygen_requests: RwLock::new(HashMap::new()),
            sign_requests: RwLock::new(HashMap::new()),
            refresh_requests: RwLock::new(HashMap::new()),
            reshare_requests: RwLock::new(HashMap::new()),
            request_counter: AtomicU64::new(0),
            clock,
        }
    }

    fn now(&self) -> u64 {
        self.clock.now()
    }

    fn next_request_id(&self, domain: &[u8], requester: Address) -> B256 {
        let counter = self.request_counter.fetch_add(1, Ordering::Relaxed);
        let mut buf = Vec::with_capacity(domain.len() + 20 + 16);
        buf.extend_from_slice(domain);
        buf.extend_from_slice(requester.as_slice());
        buf.extend_from_slice(&self.now().to_be_bytes());
        buf.extend_from_slice(&counter.to_be_bytes());
        keccak256(&buf)
    }

    /// Opens a keygen request. The caller becomes the key owner on
    /// completion.
    pub fn request_keygen(
        &self,
        caller: Address,
        protocol: Protocol,
        key_type: KeyType,
        t: u16,
        n: u16,
        participants: Vec<Address>,
    ) -> Result<B256, ThresholdError> {
        validate_threshold(t, n)?;
        if participants.len() != n as usize {
            return Err(ThresholdError::InvalidPartyCount);
        }
        if !protocol.supports(key_type) {
            return Err(ThresholdError::InvalidProtocol);
        }

        let now = self.now();
        let request_id = self.next_request_id(b"keygen", caller);
        let request = KeygenRequest {
            request_id,
            requester: caller,
            protocol,
            key_type,
            t,
            n,
            participants,
            requested_at: now,
            expires_at: now + REQUEST_TTL,
            status: RequestStatus::Pending,
            key_id: None,
        };
        debug!(%request_id, ?protocol, ?key_type, t, n, "keygen requested");
        self.keygen_requests
            .write()
            .expect("request map poisoned")
            .insert(request_id, request);
        Ok(request_id)
    }

    /// Host callback: records the DKG output and creates the key.
    pub fn complete_keygen(
        &self,
        request_id: B256,
        public_key: Bytes,
    ) -> Result<ThresholdKey, ThresholdError> {
        let now = self.now();
        let mut requests = self.keygen_requests.write().expect("request map poisoned");
        let request = requests
            .get_mut(&request_id)
            .ok_or(ThresholdError::RequestNotFound)?;
        if !request.status.is_open() {
            return Err(ThresholdError::InvalidRequestState);
        }
        if now > request.expires_at {
            request.status = RequestStatus::Expired;
            return Err(ThresholdError::RequestExpired);
        }

        let key_id = keccak256([public_key.as_ref(), request_id.as_slice()].concat());
        let evm_address = match request.key_type {
            KeyType::Secp256k1 => Some(derive_evm_address(&public_key)?),
            _ => None,
        };
        let key = ThresholdKey {
            key_id,
            protocol: request.protocol,
            key_type: request.key_type,
            public_key,
            evm_address,
            t: request.t,
            n: request.n,
            generation: 1,
            created_at: now,
            last_refresh: now,
            expires_at: 0,
            status: KeyStatus::Active,
            permissions: Permissions::new(request.requester),
        };
        request.status = RequestStatus::Complete;
        request.key_id = Some(key_id);
        info!(%request_id, %key_id, "keygen complete");

        self.keys
            .write()
            .expect("key map poisoned")
            .insert(key_id, key.clone());
        Ok(key)
    }

    /// Opens a signing request after authorization, status, expiry and
    /// quota checks.
    pub fn request_signature(
        &self,
        caller: Address,
        key_id: B256,
        message: Bytes,
        chain_id: u64,
    ) -> Result<B256, ThresholdError> {
        let now = self.now();
        let mut keys = self.keys.write().expect("key map poisoned");
        let key = keys.get_mut(&key_id).ok_or(ThresholdError::KeyNotFound)?;

        expire_if_due(key, now);
        if let Some(err) = key.status_error() {
            return Err(err);
        }
        if !key.permissions.may_sign(caller) {
            return Err(ThresholdError::Unauthorized);
        }
        if !key.permissions.allowed_chains.is_empty()
            && !key.permissions.allowed_chains.contains(&chain_id)
        {
            return Err(ThresholdError::Unauthorized);
        }

        // daily quota, reset on day-index rollover
        let day = now / SECONDS_PER_DAY;
        if day > key.permissions.last_reset_day {
            key.permissions.signs_today = 0;
            key.permissions.last_reset_day = day;
        }
        if key.permissions.max_signs_per_day > 0
            && key.permissions.signs_today >= key.permissions.max_signs_per_day
        {
            warn!(%key_id, "daily signing limit exhausted");
            return Err(ThresholdError::SigningLimitExceeded);
        }
        key.permissions.signs_today += 1;
        drop(keys);

        let request_id = self.next_request_id(b"sign", caller);
        let request = SignRequest {
            request_id,
            key_id,
            requester: caller,
            message,
            chain_id,
            requested_at: now,
            expires_at: now + REQUEST_TTL,
            status: RequestStatus::Pending,
            signature: None,
        };
        debug!(%request_id, %key_id, "signature requested");
        self.sign_requests
            .write()
            .expect("request map poisoned")
            .insert(request_id, request);
        Ok(request_id)
    }

    /// Host callback: records the produced signature.
    pub fn complete_signing(
        &self,
        request_id: B256,
        signature: Bytes,
    ) -> Result<(), ThresholdError> {
        let now = self.now();
        let mut requests = self.sign_requests.write().expect("request map poisoned");
        let request = requests
            .get_mut(&request_id)
            .ok_or(ThresholdError::RequestNotFound)?;
        if !request.status.is_open() {
            return Err(ThresholdError::InvalidRequestState);
        }
        if now > request.expires_at {
            request.status = RequestStatus::Expired;
            return Err(ThresholdError::RequestExpired);
        }
        request.signature = Some(signature);
        request.status = RequestStatus::Complete;
        debug!(%request_id, "signing complete");
        Ok(())
    }

    /// Opens a refresh request; the key leaves `active` until completion.
    pub fn request_refresh(
        &self,
        caller: Address,
        key_id: B256,
    ) -> Result<B256, ThresholdError> {
        let now = self.now();
        let mut keys = self.keys.write().expect("key map poisoned");
        let key = keys.get_mut(&key_id).ok_or(ThresholdError::KeyNotFound)?;
        expire_if_due(key, now);
        if let Some(err) = key.status_error() {
            return Err(err);
        }
        if caller != key.owner() {
            return Err(ThresholdError::Unauthorized);
        }
        key.status = KeyStatus::Refreshing;
        drop(keys);

        let request_id = self.next_request_id(b"refresh", caller);
        self.refresh_requests
            .write()
            .expect("request map poisoned")
            .insert(
                request_id,
                RefreshRequest {
                    request_id,
                    key_id,
                    requester: caller,
                    requested_at: now,
                    expires_at: now + REQUEST_TTL,
                    status: RequestStatus::Pending,
                },
            );
        info!(%request_id, %key_id, "refresh requested");
        Ok(request_id)
    }

    /// Host callback: on success the generation bumps and the key returns
    /// to `active`; on failure only the status reverts.
    pub fn complete_refresh(
        &self,
        request_id: B256,
        success: bool,
    ) -> Result<(), ThresholdError> {
        let now = self.now();
        let mut requests = self.refresh_requests.write().expect("request map poisoned");
        let request = requests
            .get_mut(&request_id)
            .ok_or(ThresholdError::RequestNotFound)?;
        if !request.status.is_open() {
            return Err(ThresholdError::InvalidRequestState);
        }

        let mut keys = self.keys.write().expect("key map poisoned");
        let key = keys
            .get_mut(&request.key_id)
            .ok_or(ThresholdError::KeyNotFound)?;
        key.status = KeyStatus::Active;
        if success {
            key.generation += 1;
            key.last_refresh = now;
            request.status = RequestStatus::Complete;
            info!(key_id = %request.key_id, generation = key.generation, "refresh complete");
        } else {
            request.status = RequestStatus::Failed;
            warn!(key_id = %request.key_id, "refresh failed");
        }
        Ok(())
    }

    /// Opens a reshare request to a new `(t, n)` committee.
    pub fn request_reshare(
        &self,
        caller: Address,
        key_id: B256,
        new_t: u16,
        new_n: u16,
        new_participants: Vec<Address>,
    ) -> Result<B256, ThresholdError> {
        validate_threshold(new_t, new_n)?;
        if new_participants.len() != new_n as usize {
            return Err(ThresholdError::InvalidPartyCount);
        }
        let now = self.now();
        let mut keys = self.keys.write().expect("key map poisoned");
        let key = keys.get_mut(&key_id).ok_or(ThresholdError::KeyNotFound)?;
        expire_if_due(key, now);
        if let Some(err) = key.status_error() {
            return Err(err);
        }
        if caller != key.owner() {
            return Err(ThresholdError::Unauthorized);
        }
        key.status = KeyStatus::Resharing;
        drop(keys);

        let request_id = self.next_request_id(b"reshare", caller);
        self.reshare_requests
            .write()
            .expect("request map poisoned")
            .insert(
                request_id,
                ReshareRequest {
                    request_id,
                    key_id,
                    requester: caller,
                    new_t,
                    new_n,
                    new_participants,
                    requested_at: now,
                    expires_at: now + REQUEST_TTL,
                    status: RequestStatus::Pending,
                },
            );
        info!(%request_id, %key_id, new_t, new_n, "reshare requested");
        Ok(request_id)
    }

    /// Host callback: applies the new committee shape. A `new_key_id`
    /// re-indexes the key map; on failure the key reverts to `active`
    /// untouched.
    pub fn complete_reshare(
        &self,
        request_id: B256,
        new_key_id: Option<B256>,
        success: bool,
    ) -> Result<(), ThresholdError> {
        let mut requests = self.reshare_requests.write().expect("request map poisoned");
        let request = requests
            .get_mut(&request_id)
            .ok_or(ThresholdError::RequestNotFound)?;
        if !request.status.is_open() {
            return Err(ThresholdError::InvalidRequestState);
        }

        let mut keys = self.keys.write().expect("key map poisoned");
        let mut key = keys
            .remove(&request.key_id)
            .ok_or(ThresholdError::KeyNotFound)?;
        key.status = KeyStatus::Active;
        if success {
            key.t = request.new_t;
            key.n = request.new_n;
            key.generation += 1;
            if let Some(id) = new_key_id {
                key.key_id = id;
            }
            request.status = RequestStatus::Complete;
            info!(key_id = %key.key_id, t = key.t, n = key.n, "reshare complete");
        } else {
            request.status = RequestStatus::Failed;
            warn!(key_id = %key.key_id, "reshare failed");
        }
        keys.insert(key.key_id, key);
        Ok(())
    }

    /// Revokes a key; terminal.
    pub fn revoke_key(&self, caller: Address, key_id: B256) -> Result<(), ThresholdError> {
        let now = self.now();
        let mut keys = self.keys.write().expect("key map poisoned");
        let key = keys.get_mut(&key_id).ok_or(ThresholdError::KeyNotFound)?;
        expire_if_due(key, now);
        if let Some(err) = key.status_error() {
            return Err(err);
        }
        if caller != key.owner() {
            return Err(ThresholdError::Unauthorized);
        }
        key.status = KeyStatus::Revoked;
        info!(%key_id, "key revoked");
        Ok(())
    }

    /// Adds an allowed signer; owner only.
    pub fn add_signer(
        &self,
        caller: Address,
        key_id: B256,
        signer: Address,
    ) -> Result<(), ThresholdError> {
        let mut keys = self.keys.write().expect("key map poisoned");
        let key = keys.get_mut(&key_id).ok_or(ThresholdError::KeyNotFound)?;
        if caller != key.owner() {
            return Err(ThresholdError::Unauthorized);
        }
        if !key.permissions.allowed_signers.contains(&signer) {
            key.permissions.allowed_signers.push(signer);
        }
        Ok(())
    }

    /// Removes an allowed signer; owner only.
    pub fn remove_signer(
        &self,
        caller: Address,
        key_id: B256,
        signer: Address,
    ) -> Result<(), ThresholdError> {
        let mut keys = self.keys.write().expect("key map poisoned");
        let key = keys.get_mut(&key_id).ok_or(ThresholdError::KeyNotFound)?;
        if caller != key.owner() {
            return Err(ThresholdError::Unauthorized);
        }
        key.permissions.allowed_signers.retain(|s| *s != signer);
        Ok(())
    }

    /// Sets the daily signing quota; owner only, zero means no limit.
    pub fn set_daily_limit(
        &self,
        caller: Address,
        key_id: B256,
        max_signs_per_day: u32,
    ) -> Result<(), ThresholdError> {
        let mut keys = self.keys.write().expect("key map poisoned");
        let key = keys.get_mut(&key_id).ok_or(ThresholdError::KeyNotFound)?;
        if caller != key.owner() {
            return Err(ThresholdError::Unauthorized);
        }
        key.permissions.max_signs_per_day = max_signs_per_day;
        Ok(())
    }

    /// Sets the key expiry; owner only, zero means never.
    pub fn set_expiry(
        &self,
        caller: Address,
        key_id: B256,
        expires_at: u64,
    ) -> Result<(), ThresholdError> {
        let mut keys = self.keys.write().expect("key map poisoned");
        let key = keys.get_mut(&key_id).ok_or(ThresholdError::KeyNotFound)?;
        if caller != key.owner() {
            return Err(ThresholdError::Unauthorized);
        }
        key.expires_at = expires_at;
        Ok(())
    }

    /// Key snapshot.
    pub fn get_key(&self, key_id: B256) -> Result<ThresholdKey, ThresholdError> {
        self.keys
            .read()
            .expect("key map poisoned")
            .get(&key_id)
            .cloned()
            .ok_or(ThresholdError::KeyNotFound)
    }

    /// Serialized group public key.
    pub fn get_public_key(&self, key_id: B256) -> Result<Bytes, ThresholdError> {
        Ok(self.get_key(key_id)?.public_key)
    }

    /// Derived EVM address; secp256k1 keys only.
    pub fn get_address(&self, key_id: B256) -> Result<Address, ThresholdError> {
        self.get_key(key_id)?
            .evm_address
            .ok_or(ThresholdError::InvalidKeyType)
    }

    /// Keys owned by an account.
    pub fn list_keys(&self, owner: Address) -> Vec<B256> {
        self.keys
            .read()
            .expect("key map poisoned")
            .values()
            .filter(|key| key.owner() == owner)
            .map(|key| key.key_id)
            .collect()
    }

    /// Verifies a signature against a managed key, forking on its
    /// protocol.
    pub fn verify_signature(
        &self,
        key_id: B256,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, ThresholdError> {
        let key = self.get_key(key_id)?;
        protocols::verify_signature(
            key.protocol,
            &key.public_key,
            crate::client::message_digest(message),
            signature,
        )
    }

    /// Signing-request snapshot.
    pub fn sign_request(&self, request_id: B256) -> Result<SignRequest, ThresholdError> {
        self.sign_requests
            .read()
            .expect("request map poisoned")
            .get(&request_id)
            .cloned()
            .ok_or(ThresholdError::RequestNotFound)
    }

    /// Keygen-request snapshot.
    pub fn keygen_request(&self, request_id: B256) -> Result<KeygenRequest, ThresholdError> {
        self.keygen_requests
            .read()
            .expect("request map poisoned")
            .get(&request_id)
            .cloned()
            .ok_or(ThresholdError::RequestNotFound)
    }

    /// Refresh-request snapshot.
    pub fn refresh_request(
        &self,
        request_id: B256,
    ) -> Result<RefreshRequest, ThresholdError> {
        self.refresh_requests
            .read()
            .expect("request map poisoned")
            .get(&request_id)
            .cloned()
            .ok_or(ThresholdError::RequestNotFound)
    }

    /// Reshare-request snapshot.
    pub fn reshare_request(
        &self,
        request_id: B256,
    ) -> Result<ReshareRequest, ThresholdError> {
        self.reshare_requests
            .read()
            .expect("request map poisoned")
            .get(&request_id)
            .cloned()
            .ok_or(ThresholdError::RequestNotFound)
    }

    /// Host cleanup pass: marks open requests past their deadline as
    /// expired. Returns how many were swept.
    pub fn expire_stale_requests(&self) -> usize {
        let now = self.now();
        let mut swept = 0;
        macro_rules! sweep {
            ($map:expr) => {
                for request in $map.write().expect("request map poisoned").values_mut() {
                    if request.status.is_open() && now > request.expires_at {
                        request.status = RequestStatus::Expired;
                        swept += 1;
                    }
                }
            };
        }
        sweep!(self.keygen_requests);
        sweep!(self.sign_requests);
        sweep!(self.refresh_requests);
        sweep!(self.reshare_requests);
        swept
    }
}

fn expire_if_due(key: &mut ThresholdKey, now: u64) {
    if key.status == KeyStatus::Active && key.expires_at > 0 && now > key.expires_at {
        key.status = KeyStatus::Expired;
    }
}

/// Keccak-256 of the uncompressed public key, low 20 bytes.
pub fn derive_evm_address(public_key: &[u8]) -> Result<Address, ThresholdError> {
    use k256::elliptic_curve::sec1::ToEncodedPoint;
    let verifying_key = k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|_| ThresholdError::Malformed("public key"))?;
    let uncompressed = verifying_key.to_encoded_point(false);
    let digest = keccak256(&uncompressed.as_bytes()[1..]);
    Ok(Address::from_slice(&digest[12..]))
}
