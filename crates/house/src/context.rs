//! House context - wires certificates, ledger and sync together
//!
//! Every state change is appended to the ledger first and then applied to the
//! in-memory state, so replaying the ledger on startup rebuilds exactly the
//! same consumed nonces, seats, issued certificates and spent-set.

use crate::config::HouseConfig;
use crate::error::HouseError;
use crate::records::{
    Admission, AdmissionMethod, ChallengeIssued, ExportBatch, IssuedReceipt, ReceiptSpent,
    RoundLocked, RoundSettled, SessionClosed, SyncExport,
};
use rollet_certs::authorization::AllowList;
use rollet_certs::{
    bet, house, join, receipt, spend_code, totp, BankReceipt, BetCertificate, HouseCertificate,
    JoinChallenge, JoinResponse, PairingPayload, SeatBets, Winner,
};
use rollet_core::time::{self, check_window};
use rollet_core::{Amount, Keypair, PublicKey, TrustError};
use rollet_ledger::{
    merkle_root, verify_chain, AppendOptions, EventType, JsonlStore, Ledger, LedgerEntry,
    LedgerError, LedgerStore,
};
use rollet_sync::{HttpAuthority, SyncReport, Syncer};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Keys and certificates the house runs with
pub struct HouseIdentity {
    pub key: Arc<Keypair>,
    pub cert: HouseCertificate,
    pub root_public_key: PublicKey,
}

#[derive(Debug, Default)]
struct RoundState {
    consumed_nonces: HashSet<String>,
    /// seat -> player uid
    seats: BTreeMap<u32, String>,
    locked: bool,
    settled: bool,
    closed: bool,
}

/// State rebuilt from the ledger
#[derive(Debug, Default)]
struct HouseState {
    /// Outstanding challenges only; consumed or closed ones are dropped
    challenges: HashMap<String, ChallengeIssued>,
    rounds: HashMap<String, RoundState>,
    bet_certs: HashMap<String, BetCertificate>,
    /// Bet certificates replaced by a renewal
    superseded: HashSet<String>,
    /// Bet certificates a receipt was issued against
    settled_certs: HashSet<String>,
    receipts: HashMap<String, BankReceipt>,
    /// spend code -> receipt id
    spend_codes: HashMap<String, String>,
    spent: HashSet<String>,
}

impl HouseState {
    fn apply(&mut self, entry: &LedgerEntry) -> Result<(), HouseError> {
        let corrupt = |e: serde_json::Error| HouseError::CorruptLedger {
            seq: entry.seq,
            reason: e.to_string(),
        };

        match entry.event_type {
            EventType::JoinChallengeIssued => {
                let issued: ChallengeIssued = entry.payload_as().map_err(corrupt)?;
                self.challenges.insert(issued.nonce.clone(), issued);
            }
            EventType::Admission => {
                let admission: Admission = entry.payload_as().map_err(corrupt)?;
                self.challenges.remove(&admission.nonce);
                let round = self.rounds.entry(admission.round).or_default();
                round.consumed_nonces.insert(admission.nonce);
                round.seats.insert(admission.seat, admission.player_uid);
            }
            EventType::BetCertIssued => {
                let cert: BetCertificate = entry.payload_as().map_err(corrupt)?;
                if let Some(previous) = &cert.payload.renewal_of {
                    self.superseded.insert(previous.clone());
                }
                self.bet_certs.insert(cert.cert_id().to_string(), cert);
            }
            EventType::ReceiptIssued => {
                let issued: IssuedReceipt = entry.payload_as().map_err(corrupt)?;
                let receipt_id = issued.receipt.receipt_id().to_string();
                self.settled_certs
                    .insert(issued.receipt.payload.bet_cert_ref.clone());
                self.spend_codes.insert(issued.spend_code, receipt_id.clone());
                self.receipts.insert(receipt_id, issued.receipt);
            }
            EventType::ReceiptSpent => {
                let spent: ReceiptSpent = entry.payload_as().map_err(corrupt)?;
                self.spent.insert(spent.receipt_id);
            }
            EventType::SessionClosed => {
                let closed: SessionClosed = entry.payload_as().map_err(corrupt)?;
                self.challenges.retain(|_, c| c.round != closed.round);
                self.rounds.entry(closed.round).or_default().closed = true;
            }
            EventType::RoundLocked => {
                let locked: RoundLocked = entry.payload_as().map_err(corrupt)?;
                self.rounds.entry(locked.round).or_default().locked = true;
            }
            EventType::RoundSettled => {
                let settled: RoundSettled = entry.payload_as().map_err(corrupt)?;
                self.rounds.entry(settled.round).or_default().settled = true;
            }
            EventType::SyncExport => {}
        }
        Ok(())
    }

    fn is_closed(&self, round: &str) -> bool {
        self.rounds.get(round).is_some_and(|r| r.closed)
    }

    fn is_locked(&self, round: &str) -> bool {
        self.rounds.get(round).is_some_and(|r| r.locked)
    }

    fn is_settled(&self, round: &str) -> bool {
        self.rounds.get(round).is_some_and(|r| r.settled)
    }

    fn nonce_consumed(&self, round: &str, nonce: &str) -> bool {
        self.rounds
            .get(round)
            .is_some_and(|r| r.consumed_nonces.contains(nonce))
    }
}

/// Snapshot for operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseStatus {
    pub house_id: String,
    pub key_id: String,
    pub last_seq: u64,
    pub watermark: u64,
    pub unsynced: usize,
    pub offline: bool,
    pub open_rounds: usize,
    pub receipts_outstanding: usize,
}

/// House context - the single ledger writer on the house device
pub struct HouseContext<S: LedgerStore = JsonlStore> {
    identity: HouseIdentity,
    ledger: Ledger<S>,
    syncer: Syncer,
    config: HouseConfig,
    state: HouseState,
    /// player id -> TOTP secret; never persisted
    pairings: HashMap<String, Vec<u8>>,
}

/// House key from config: inline hex first, then the key file
pub fn load_house_key(config: &HouseConfig) -> Result<Keypair, HouseError> {
    if let Some(hex_seed) = &config.house_key {
        return Ok(Keypair::from_hex(hex_seed.trim())?);
    }
    let seed = std::fs::read_to_string(&config.house_key_path).map_err(|e| {
        HouseError::Config(format!(
            "house key {}: {}",
            config.house_key_path.display(),
            e
        ))
    })?;
    Ok(Keypair::from_hex(seed.trim())?)
}

impl HouseContext<JsonlStore> {
    /// Load identity files, open the JSONL ledger and pick the sync mode
    pub fn open(config: HouseConfig) -> Result<Self, HouseError> {
        let key = load_house_key(&config)?;

        let cert_text = std::fs::read_to_string(&config.house_cert_path).map_err(|e| {
            HouseError::Config(format!(
                "house certificate {}: {}",
                config.house_cert_path.display(),
                e
            ))
        })?;
        let cert = HouseCertificate::import(&cert_text)?;

        let root_hex = config.root_public_key.as_deref().ok_or_else(|| {
            HouseError::Config("root public key not configured (ROLLET_ROOT_PUBLIC_KEY)".into())
        })?;
        let root_public_key = PublicKey::from_hex(root_hex.trim())?;

        let allow_list = config
            .allow_list_path
            .as_ref()
            .map(AllowList::from_file)
            .transpose()?;

        let ledger = Ledger::open_dir(&config.data_dir)?;

        let policy = config.retry_policy();
        let syncer = match &config.auth_url {
            Some(url) => {
                let authority = HttpAuthority::new(url, policy.request_timeout)?;
                Syncer::new(Arc::new(authority), policy)
            }
            None => Syncer::offline(),
        };

        let identity = HouseIdentity {
            key: Arc::new(key),
            cert,
            root_public_key,
        };
        Self::new(identity, allow_list.as_ref(), ledger, syncer, config)
    }
}

impl<S: LedgerStore> HouseContext<S> {
    /// Check the house identity, then replay `ledger` to rebuild state.
    ///
    /// The certificate must be valid now, present in `allow_list` when one
    /// is given, and certify the public half of the house key.
    pub fn new(
        identity: HouseIdentity,
        allow_list: Option<&AllowList>,
        ledger: Ledger<S>,
        syncer: Syncer,
        config: HouseConfig,
    ) -> Result<Self, HouseError> {
        // 1. Certificate validity
        house::check(&identity.cert, &identity.root_public_key, time::now())?;

        // 2. Authorization
        if let Some(allow_list) = allow_list {
            if !allow_list.is_authorized(&identity.cert) {
                warn!(house_id = %identity.cert.house_id(), "house certificate not on the allow-list");
                return Err(TrustError::NotAuthorized.into());
            }
        }

        // 3. Key matches certificate
        if identity.key.public_key() != *identity.cert.public_key() {
            return Err(HouseError::KeyMismatch);
        }

        let ledger = ledger.with_signer(identity.key.clone());
        let mut ctx = Self {
            identity,
            ledger,
            syncer,
            config,
            state: HouseState::default(),
            pairings: HashMap::new(),
        };
        ctx.replay()?;
        Ok(ctx)
    }

    fn replay(&mut self) -> Result<(), HouseError> {
        let entries = self.ledger.entries()?;
        verify_chain(&entries).map_err(LedgerError::from)?;
        for entry in &entries {
            self.state.apply(entry)?;
        }
        info!(
            house_id = %self.house_id(),
            entries = entries.len(),
            spent = self.state.spent.len(),
            "house state replayed"
        );
        Ok(())
    }

    /// Append then apply, so memory never runs ahead of the ledger
    fn commit<T: Serialize>(
        &mut self,
        event_type: EventType,
        payload: &T,
        opts: AppendOptions,
    ) -> Result<LedgerEntry, HouseError> {
        let entry = self.ledger.append(event_type, payload, opts)?;
        self.state.apply(&entry)?;
        Ok(entry)
    }

    pub fn house_id(&self) -> &str {
        self.identity.cert.house_id()
    }

    pub fn house_cert(&self) -> &HouseCertificate {
        &self.identity.cert
    }

    pub fn house_public_key(&self) -> PublicKey {
        self.identity.key.public_key()
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn config(&self) -> &HouseConfig {
        &self.config
    }

    // === Join ===

    /// Issue a fresh join challenge for `round`
    pub fn open_join(&mut self, round: &str) -> Result<JoinChallenge, HouseError> {
        if self.state.is_closed(round) {
            return Err(HouseError::RoundClosed(round.to_string()));
        }

        let challenge = join::create_challenge(
            &self.identity.cert,
            round,
            self.config.challenge_ttl(),
            time::now(),
        );
        let issued = ChallengeIssued {
            round: challenge.round.clone(),
            nonce: challenge.nonce.clone(),
            not_before: challenge.not_before,
            not_after: challenge.not_after,
        };
        self.commit(EventType::JoinChallengeIssued, &issued, AppendOptions::default())?;
        Ok(challenge)
    }

    /// Challenge must be ours, unexpired and unconsumed
    fn check_challenge(&self, challenge: &JoinChallenge) -> Result<(), HouseError> {
        if challenge.house_cert != self.identity.cert {
            return Err(TrustError::ChallengeMismatch("house").into());
        }
        if self.state.is_closed(&challenge.round) {
            return Err(HouseError::RoundClosed(challenge.round.clone()));
        }
        if self.state.nonce_consumed(&challenge.round, &challenge.nonce) {
            warn!(round = %challenge.round, "join nonce replayed");
            return Err(TrustError::ReplayDetected(format!(
                "nonce {} already consumed",
                challenge.nonce
            ))
            .into());
        }
        let issued = self
            .state
            .challenges
            .get(&challenge.nonce)
            .ok_or(TrustError::ChallengeMismatch("nonce"))?;
        if issued.round != challenge.round {
            return Err(TrustError::ChallengeMismatch("round").into());
        }
        // The issued window, not whatever the caller carried
        check_window(time::now(), issued.not_before, Some(issued.not_after))?;
        Ok(())
    }

    fn consume(
        &mut self,
        challenge: &JoinChallenge,
        seat: u32,
        player_uid: &str,
        method: AdmissionMethod,
        bank_ref: Option<String>,
    ) -> Result<Admission, HouseError> {
        if let Some(round) = self.state.rounds.get(&challenge.round) {
            if let Some(holder) = round.seats.get(&seat) {
                if holder != player_uid {
                    return Err(HouseError::SeatTaken {
                        round: challenge.round.clone(),
                        seat,
                    });
                }
            }
        }

        let admission = Admission {
            round: challenge.round.clone(),
            seat,
            player_uid: player_uid.to_string(),
            nonce: challenge.nonce.clone(),
            method,
            bank_ref,
        };
        self.commit(EventType::Admission, &admission, AppendOptions::default())?;
        info!(round = %admission.round, seat, player = %admission.player_uid, "player admitted");
        Ok(admission)
    }

    /// Admit a player by signed join response, consuming the nonce
    pub fn admit(
        &mut self,
        response: &JoinResponse,
        challenge: &JoinChallenge,
    ) -> Result<Admission, HouseError> {
        self.check_challenge(challenge)?;
        join::check_response(response, challenge)?;

        let payload = &response.payload;
        self.consume(
            challenge,
            payload.seat,
            &payload.player_uid,
            AdmissionMethod::Response,
            payload.bank_ref.clone(),
        )
    }

    /// Remember a paired device's TOTP secret
    pub fn pair(&mut self, pairing: &PairingPayload) -> Result<(), HouseError> {
        let secret = pairing.secret_bytes()?;
        if secret.is_empty() {
            return Err(TrustError::MalformedPayload("empty pairing secret".into()).into());
        }
        self.pairings.insert(pairing.player_id.clone(), secret);
        debug!(player = %pairing.player_id, "device paired");
        Ok(())
    }

    /// Admit a paired player who typed the TOTP code for `challenge`
    pub fn admit_by_code(
        &mut self,
        player_id: &str,
        code: &str,
        challenge: &JoinChallenge,
        seat: u32,
    ) -> Result<Admission, HouseError> {
        self.check_challenge(challenge)?;

        let secret = self
            .pairings
            .get(player_id)
            .ok_or(TrustError::NotAuthorized)?;
        let accepted = totp::verify(
            code.trim(),
            secret,
            &challenge.round,
            &challenge.nonce,
            time::now(),
            self.config.totp_step(),
            self.config.totp_window,
        );
        if !accepted {
            debug!(player = %player_id, round = %challenge.round, "totp code rejected");
            return Err(TrustError::ChallengeMismatch("totp code").into());
        }

        self.consume(challenge, seat, player_id, AdmissionMethod::Code, None)
    }

    /// Seat map for `round`
    pub fn seats(&self, round: &str) -> BTreeMap<u32, String> {
        self.state
            .rounds
            .get(round)
            .map(|r| r.seats.clone())
            .unwrap_or_default()
    }

    // === Bets ===

    fn require_seat(&self, round: &str, seat: &SeatBets) -> Result<(), HouseError> {
        let held = self
            .state
            .rounds
            .get(round)
            .and_then(|r| r.seats.get(&seat.seat));
        if held != Some(&seat.player) {
            return Err(HouseError::SeatNotAdmitted {
                seat: seat.seat,
                player: seat.player.clone(),
            });
        }
        Ok(())
    }

    /// Certify every seat's bets; each seat must hold an admission.
    ///
    /// A round locks once. Later top-ups go through [`Self::renew`].
    pub fn lock_round(
        &mut self,
        round: &str,
        seats: &[SeatBets],
    ) -> Result<Vec<BetCertificate>, HouseError> {
        if self.state.is_closed(round) {
            return Err(HouseError::RoundClosed(round.to_string()));
        }
        if self.state.is_locked(round) {
            return Err(HouseError::RoundAlreadyLocked(round.to_string()));
        }
        for seat in seats {
            self.require_seat(round, seat)?;
        }

        let certs = bet::lock_round(
            seats,
            &self.identity.key,
            round,
            time::now(),
            self.config.bet_cert_ttl(),
        );

        let locked = RoundLocked {
            round: round.to_string(),
            seats: seats.iter().map(|s| s.seat).collect(),
            cert_ids: certs.iter().map(|c| c.cert_id().to_string()).collect(),
        };
        self.commit(EventType::RoundLocked, &locked, AppendOptions::default())?;
        for cert in &certs {
            self.commit(EventType::BetCertIssued, cert, AppendOptions::default())?;
        }
        Ok(certs)
    }

    /// Supersede a bet certificate after a mid-round top-up
    pub fn renew(
        &mut self,
        previous_cert_id: &str,
        seat: &SeatBets,
    ) -> Result<BetCertificate, HouseError> {
        let previous = self
            .state
            .bet_certs
            .get(previous_cert_id)
            .cloned()
            .ok_or_else(|| HouseError::UnknownBetCert(previous_cert_id.to_string()))?;
        if previous.payload.seat != seat.seat || previous.payload.player != seat.player {
            return Err(HouseError::SeatNotAdmitted {
                seat: seat.seat,
                player: seat.player.clone(),
            });
        }
        if self.state.is_closed(&previous.payload.round) {
            return Err(HouseError::RoundClosed(previous.payload.round.clone()));
        }
        if self.state.is_settled(&previous.payload.round) {
            return Err(HouseError::RoundAlreadySettled(previous.payload.round.clone()));
        }
        if self.state.superseded.contains(previous_cert_id) {
            return Err(HouseError::SupersededBetCert(previous_cert_id.to_string()));
        }

        let cert = bet::renew(
            &previous,
            seat,
            &self.identity.key,
            time::now(),
            self.config.bet_cert_ttl(),
        );
        self.commit(EventType::BetCertIssued, &cert, AppendOptions::default())?;
        Ok(cert)
    }

    /// The live tip of a seat's renewal chain
    pub fn authoritative_cert(&self, round: &str, seat: u32) -> Option<BetCertificate> {
        let chain: Vec<BetCertificate> = self
            .state
            .bet_certs
            .values()
            .filter(|c| c.payload.round == round && c.payload.seat == seat)
            .cloned()
            .collect();
        bet::authoritative(&chain, &self.identity.key.public_key(), time::now()).cloned()
    }

    // === Settlement ===

    /// Issue receipts to winners, each with its spend code.
    ///
    /// A locked round settles once, and each winner must reference the
    /// unrenewed tip of its seat's certificate chain at most once.
    pub fn settle(
        &mut self,
        round: &str,
        winners: &[Winner],
    ) -> Result<Vec<IssuedReceipt>, HouseError> {
        if self.state.is_closed(round) {
            return Err(HouseError::RoundClosed(round.to_string()));
        }
        if self.state.is_settled(round) {
            warn!(round = %round, "round already settled");
            return Err(
                TrustError::ReplayDetected(format!("round {} already settled", round)).into(),
            );
        }
        if !self.state.is_locked(round) {
            return Err(HouseError::RoundNotLocked(round.to_string()));
        }

        let mut referenced = HashSet::new();
        for winner in winners {
            let cert_ref = winner.bet_cert_ref.as_str();
            let known = self.state.bet_certs.get(cert_ref).is_some_and(|c| {
                c.payload.round == round && c.payload.player == winner.player
            });
            if !known {
                return Err(HouseError::UnknownBetCert(cert_ref.to_string()));
            }
            if self.state.superseded.contains(cert_ref) {
                return Err(HouseError::SupersededBetCert(cert_ref.to_string()));
            }
            if !referenced.insert(cert_ref) || self.state.settled_certs.contains(cert_ref) {
                warn!(round = %round, bet_cert = %cert_ref, "bet certificate paid twice");
                return Err(TrustError::ReplayDetected(format!(
                    "bet certificate {} already settled",
                    cert_ref
                ))
                .into());
            }
        }

        let total = winners
            .iter()
            .filter(|w| w.value.is_positive())
            .try_fold(Amount::ZERO, |acc, w| acc.checked_add(&w.value))
            .ok_or_else(|| HouseError::PayoutOverflow(round.to_string()))?;

        let receipts = receipt::issue_for_winners(
            winners,
            round,
            &self.identity.key,
            time::now(),
            self.config.receipt_ttl(),
        );

        let mut issued = Vec::with_capacity(receipts.len());
        for receipt in receipts {
            let record = IssuedReceipt {
                spend_code: spend_code::compute(&receipt, self.house_id()),
                receipt,
            };
            self.commit(EventType::ReceiptIssued, &record, AppendOptions::default())?;
            issued.push(record);
        }

        let settled = RoundSettled {
            round: round.to_string(),
            receipt_ids: issued
                .iter()
                .map(|r| r.receipt.receipt_id().to_string())
                .collect(),
            total,
        };
        self.commit(EventType::RoundSettled, &settled, AppendOptions::default())?;
        info!(round = %round, receipts = issued.len(), total = %total, "round settled");
        Ok(issued)
    }

    // === Redemption ===

    /// Redeem a receipt once.
    ///
    /// Verify, check the spent-set, append `receipt_spent`, then record it.
    pub fn spend(&mut self, receipt: &BankReceipt) -> Result<ReceiptSpent, HouseError> {
        receipt::check(receipt, &self.identity.key.public_key(), time::now())?;

        let receipt_id = receipt.receipt_id();
        if self.state.spent.contains(receipt_id) {
            warn!(receipt_id = %receipt_id, "receipt already spent");
            return Err(TrustError::ReplayDetected(format!("receipt {} already spent", receipt_id)).into());
        }

        let spent = ReceiptSpent {
            receipt_id: receipt_id.to_string(),
            player: receipt.payload.player.clone(),
            round: receipt.payload.round.clone(),
            value: receipt.value(),
        };
        self.commit(EventType::ReceiptSpent, &spent, AppendOptions::default())?;
        info!(receipt_id = %receipt_id, value = %spent.value, "receipt spent");
        Ok(spent)
    }

    /// Redeem by typed spend code, resolved against issued receipts
    pub fn spend_by_code(&mut self, code: &str) -> Result<ReceiptSpent, HouseError> {
        let code = spend_code::normalize(code);
        if !spend_code::luhn_valid(&code) {
            return Err(TrustError::MalformedPayload("spend code checksum".into()).into());
        }
        let receipt = self
            .state
            .spend_codes
            .get(&code)
            .and_then(|id| self.state.receipts.get(id))
            .cloned()
            .ok_or_else(|| HouseError::UnknownSpendCode(code.clone()))?;
        self.spend(&receipt)
    }

    pub fn is_spent(&self, receipt_id: &str) -> bool {
        self.state.spent.contains(receipt_id)
    }

    // === Session ===

    /// Close `round`; later joins, locks and settlements are refused
    pub fn close_session(&mut self, round: &str) -> Result<LedgerEntry, HouseError> {
        if self.state.is_closed(round) {
            return Err(HouseError::RoundClosed(round.to_string()));
        }
        let closed = SessionClosed {
            round: round.to_string(),
            admitted: self.state.rounds.get(round).map_or(0, |r| r.seats.len()),
        };
        self.commit(EventType::SessionClosed, &closed, AppendOptions::default())
    }

    /// Package unsynced entries with their Merkle root.
    ///
    /// The export itself is logged as a `sync_export` entry carrying the root.
    pub fn export(&mut self) -> Result<ExportBatch, HouseError> {
        let entries = self.ledger.unsynced()?;
        let root = merkle_root(&entries);

        if let (Some(first), Some(last), Some(root)) = (entries.first(), entries.last(), &root) {
            let export = SyncExport {
                from_seq: first.seq,
                to_seq: last.seq,
                count: entries.len(),
            };
            self.commit(
                EventType::SyncExport,
                &export,
                AppendOptions::with_merkle_root(root.clone()),
            )?;
        }

        Ok(ExportBatch {
            house_id: self.house_id().to_string(),
            entries,
            merkle_root: root,
        })
    }

    /// Push unsynced entries to the authority (or mark them locally when offline)
    pub async fn sync(&self) -> Result<SyncReport, HouseError> {
        let report = self
            .syncer
            .sync(&self.ledger, &self.identity.cert, &self.identity.key)
            .await?;
        Ok(report)
    }

    pub fn status(&self) -> Result<HouseStatus, HouseError> {
        Ok(HouseStatus {
            house_id: self.house_id().to_string(),
            key_id: self.identity.cert.key_id(),
            last_seq: self.ledger.last_seq()?,
            watermark: self.ledger.watermark()?,
            unsynced: self.ledger.unsynced()?.len(),
            offline: self.syncer.is_offline(),
            open_rounds: self.state.rounds.values().filter(|r| !r.closed).count(),
            receipts_outstanding: self
                .state
                .receipts
                .keys()
                .filter(|id| !self.state.spent.contains(*id))
                .count(),
        })
    }
}
