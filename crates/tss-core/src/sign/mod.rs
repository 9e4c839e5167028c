//! Threshold ECDSA signing over secp256k1
//!
//! A signing set of `t` peers turns its Birkhoff shares into additive shares
//! `w_i = c_i·share_i` of the key and runs a ten-round protocol:
//!
//! 1. `Pubkey`: broadcast `W_i = w_i·G` with a proof of knowledge; the sum
//!    must equal the expected public key.
//! 2. `EncK`: pick nonces `k_i`, `γ_i`; broadcast `Enc_i(k_i)` under the own
//!    homomorphic key and a commitment to `Γ_i = γ_i·G`.
//! 3. `Mta`: multiplicative-to-additive conversion with every peer, giving
//!    additive shares of `k·γ` and `k·w`.
//! 4. `Delta`: broadcast `δ_i`; `δ = k·γ` is public.
//! 5. `ProofAi`: open `Γ_i` with a proof; `R = δ⁻¹·ΣΓ_i = k⁻¹·G`. The share
//!    `s_i = m·k_i + r·σ_i` is computed but kept.
//! 6. `CommitViAi`: commit to `V_i = s_i·R + l_i·G` and `A_i = ρ_i·G`.
//! 7. `DecommitViAi`: open them with proofs of knowledge.
//! 8. `CommitUiTi`: commit to `U_i = ρ_i·V` and `T_i = l_i·A`.
//! 9. `DecommitUiTi`: open them; `ΣU_j` must equal `ΣT_j`.
//! 10. `Si`: broadcast `s_i`; the sum is the signature.

mod check;
mod messages;
mod nonce;
mod reveal;

pub use messages::*;

use crate::birkhoff::{compute_bk_coefficients, is_identity, BkParameter};
use crate::homo::{HomoCrypto, HomoPublicKey};
use crate::message::{MessageMain, MsgMain, Peers, State, StateChangedListener};
use crate::mpc::PeerManager;
use crate::types::{curve_order, reduce_to_scalar};
use crate::{Error, PeerId, Result, Signature};
use k256::{ProjectivePoint, Scalar};
use nonce::PubkeyHandler;
use num_bigint::BigUint;
use reveal::SiHandler;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use zeroize::Zeroize;

/// `q⁵`, the bound of the MtA blinding values
fn mta_blind_bound() -> BigUint {
    curve_order().pow(5u32)
}

/// The plaintext space must hold `k·x + β'` without wrapping
fn has_mta_capacity(key: &dyn HomoPublicKey) -> bool {
    let q = curve_order();
    *key.message_range() > mta_blind_bound() + &q * &q
}

fn unexpected(round: &str) -> Error {
    Error::Internal(format!("unexpected message body in {} round", round))
}

/// State shared by every round of one signing session
pub(crate) struct SignContext {
    pub peer_manager: Arc<dyn PeerManager<SignMessage>>,
    pub expected_public_key: ProjectivePoint,
    pub homo: Arc<dyn HomoCrypto>,
    /// Additive share of the key over the signing set
    pub w: Scalar,
    /// SHA-256 of the signed message
    pub digest: [u8; 32],
    /// Added to `s_i` to model a cheating signer
    #[cfg(test)]
    pub share_offset: Scalar,
}

impl SignContext {
    pub fn self_id(&self) -> &PeerId {
        self.peer_manager.self_id()
    }

    pub fn message(&self, body: SignBody) -> SignMessage {
        SignMessage {
            id: self.self_id().clone(),
            body,
        }
    }

    pub fn broadcast(&self, body: SignBody) {
        self.peer_manager.broadcast(&self.message(body));
    }

    pub fn send(&self, to: &PeerId, body: SignBody) {
        self.peer_manager.must_send(to, &self.message(body));
    }

    /// Hashed message as a scalar
    pub fn m(&self) -> Scalar {
        reduce_to_scalar(&self.digest)
    }

    /// Proof context binding a Schnorr proof to its round and prover
    pub fn proof_context(&self, label: &str, prover: &str) -> Vec<u8> {
        let mut context = Vec::with_capacity(label.len() + prover.len() + 32);
        context.extend_from_slice(label.as_bytes());
        context.extend_from_slice(&self.digest);
        context.extend_from_slice(prover.as_bytes());
        context
    }
}

impl Drop for SignContext {
    fn drop(&mut self) {
        self.w.zeroize();
    }
}

/// Threshold ECDSA signer for one peer of the signing set
pub struct Signer {
    engine: MsgMain<SignMessage>,
}

impl Signer {
    /// Create the signer
    ///
    /// `bks` holds the Birkhoff parameter of every member of the signing set,
    /// this peer included; `secret` is this peer's share.
    #[instrument(skip_all, fields(peer = %peer_manager.self_id()))]
    pub fn new(
        peer_manager: Arc<dyn PeerManager<SignMessage>>,
        expected_public_key: ProjectivePoint,
        homo: Arc<dyn HomoCrypto>,
        secret: Scalar,
        bks: BTreeMap<PeerId, BkParameter>,
        message: &[u8],
        listener: Arc<dyn StateChangedListener>,
    ) -> Result<Self> {
        let context = Self::context(
            peer_manager.clone(),
            expected_public_key,
            homo,
            secret,
            &bks,
            message,
        )?;
        let signer = Self::from_context(peer_manager, context, listener)?;
        info!(signers = bks.len(), "Signer created");
        Ok(signer)
    }

    fn context(
        peer_manager: Arc<dyn PeerManager<SignMessage>>,
        expected_public_key: ProjectivePoint,
        homo: Arc<dyn HomoCrypto>,
        secret: Scalar,
        bks: &BTreeMap<PeerId, BkParameter>,
        message: &[u8],
    ) -> Result<SignContext> {
        if is_identity(&expected_public_key) {
            return Err(Error::IdentityPublicKey);
        }
        let self_id = peer_manager.self_id().clone();
        if !bks.contains_key(&self_id) {
            return Err(Error::NoSelfBk);
        }
        let peer_ids = peer_manager.peer_ids();
        if bks.len() != peer_ids.len() + 1 || peer_ids.iter().any(|id| !bks.contains_key(id)) {
            warn!(bks = bks.len(), peers = peer_ids.len(), "Inconsistent peer num");
            return Err(Error::InconsistentPeerNumAndBks {
                bks: bks.len(),
                peers: peer_ids.len(),
            });
        }
        if !has_mta_capacity(homo.public_key()) {
            return Err(Error::InvalidConfig(
                "homomorphic plaintext space too small for MtA".into(),
            ));
        }

        let params: Vec<BkParameter> = bks.values().copied().collect();
        let coefficients = compute_bk_coefficients(&params, bks.len())?;
        let self_coefficient = bks
            .keys()
            .zip(coefficients)
            .find_map(|(id, c)| (*id == self_id).then_some(c))
            .ok_or(Error::NoSelfBk)?;

        Ok(SignContext {
            peer_manager,
            expected_public_key,
            homo,
            w: secret * self_coefficient,
            digest: Sha256::digest(message).into(),
            #[cfg(test)]
            share_offset: Scalar::ZERO,
        })
    }

    fn from_context(
        peer_manager: Arc<dyn PeerManager<SignMessage>>,
        context: SignContext,
        listener: Arc<dyn StateChangedListener>,
    ) -> Result<Self> {
        let peers = Peers::from_ids(peer_manager.peer_ids());
        let engine = MsgMain::new(
            peer_manager,
            peers,
            listener,
            Box::new(PubkeyHandler::new(context)),
            SIGN_MESSAGE_TYPES.to_vec(),
        )?;
        Ok(Self { engine })
    }

    /// Broadcast the public share and begin accepting messages
    pub fn start(&self) -> Result<()> {
        self.engine.start()
    }

    pub fn state(&self) -> State {
        self.engine.state()
    }

    pub fn handle_message(&self, message: SignMessage) -> Result<()> {
        self.engine.handle_message(message)
    }

    /// The verified, low-s signature
    pub fn result(&self) -> Result<Signature> {
        self.engine
            .with_final_handler(|handler: &SiHandler| handler.signature().cloned())?
            .ok_or(Error::NotReady)
    }
}

impl MessageMain<SignMessage> for Signer {
    fn handle_message(&self, message: SignMessage) -> Result<()> {
        self.engine.handle_message(message)
    }

    fn state(&self) -> State {
        self.engine.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::birkhoff::{deal_shares, shamir_parameters};
    use crate::homo::paillier::test_keys;
    use crate::message::{ProtocolMessage, StateWatcher};
    use crate::mpc::{testing, MemoryNetwork};
    use crate::types::encode_point;
    use crate::zkproof::SchnorrProof;
    use k256::ecdsa::signature::Verifier;
    use k256::ecdsa::{Signature as EcdsaSignature, VerifyingKey};
    use k256::elliptic_curve::Field;
    use rand::rngs::OsRng;
    use std::sync::Mutex;

    const MESSAGE: &[u8] = b"transfer 10 coins to bob";

    struct Dealt {
        public_key: ProjectivePoint,
        shares: Vec<Scalar>,
        bks: Vec<BkParameter>,
    }

    fn deal(n: usize, threshold: usize) -> Dealt {
        let secret = Scalar::random(&mut OsRng);
        let bks = shamir_parameters(n);
        let shares = deal_shares(&mut OsRng, &secret, &bks, threshold).unwrap();
        Dealt {
            public_key: ProjectivePoint::GENERATOR * secret,
            shares,
            bks,
        }
    }

    /// Signers for the members `set` (indices into `dealt`)
    fn signers(
        dealt: &Dealt,
        set: &[usize],
        public_key: ProjectivePoint,
    ) -> (MemoryNetwork, Vec<(Arc<Signer>, Arc<StateWatcher>)>) {
        signers_with_cheater(dealt, set, public_key, None)
    }

    /// Like [`signers`], with the signer in slot `cheater` skewing its `s_i`
    fn signers_with_cheater(
        dealt: &Dealt,
        set: &[usize],
        public_key: ProjectivePoint,
        cheater: Option<usize>,
    ) -> (MemoryNetwork, Vec<(Arc<Signer>, Arc<StateWatcher>)>) {
        let ids: Vec<String> = set.iter().map(|i| format!("p{}", i)).collect();
        let network = MemoryNetwork::new(ids.clone());
        let bks: BTreeMap<PeerId, BkParameter> = set
            .iter()
            .zip(&ids)
            .map(|(&i, id)| (id.clone(), dealt.bks[i]))
            .collect();

        let parties = set
            .iter()
            .zip(&ids)
            .enumerate()
            .map(|(slot, (&i, id))| {
                let watcher = Arc::new(StateWatcher::new());
                let pm: Arc<dyn PeerManager<SignMessage>> =
                    network.peer_manager::<SignMessage>(id).unwrap();
                let mut context = Signer::context(
                    pm.clone(),
                    public_key,
                    Arc::new(test_keys::paillier(slot)),
                    dealt.shares[i],
                    &bks,
                    MESSAGE,
                )
                .unwrap();
                if cheater == Some(slot) {
                    context.share_offset = Scalar::ONE;
                }
                let signer = Signer::from_context(pm, context, watcher.clone()).unwrap();
                (Arc::new(signer), watcher)
            })
            .collect();
        (network, parties)
    }

    /// Forwards to a signer and records every message type it is handed
    struct Recorder {
        signer: Arc<Signer>,
        seen: Mutex<Vec<SignMessageType>>,
    }

    impl MessageMain<SignMessage> for Recorder {
        fn handle_message(&self, message: SignMessage) -> Result<()> {
            self.seen.lock().unwrap().push(message.message_type());
            self.signer.handle_message(message)
        }

        fn state(&self) -> State {
            self.signer.state()
        }
    }

    async fn run(
        network: &MemoryNetwork,
        parties: &[(Arc<Signer>, Arc<StateWatcher>)],
    ) -> Vec<State> {
        for (signer, _) in parties {
            signer.start().unwrap();
        }
        // Parties are created in network order
        let parties = parties
            .iter()
            .zip(network.ids())
            .map(|((signer, watcher), id)| {
                let target: Arc<dyn MessageMain<SignMessage>> = signer.clone();
                (id.clone(), target, watcher.clone())
            })
            .collect();
        testing::drive(network, parties).await
    }

    fn assert_valid(signature: &Signature, public_key: &ProjectivePoint) {
        let ecdsa = EcdsaSignature::from_slice(&signature.to_bytes()).unwrap();
        assert!(ecdsa.normalize_s().is_none(), "signature must be low-s");
        let key = VerifyingKey::from_affine(public_key.to_affine()).unwrap();
        key.verify(MESSAGE, &ecdsa).unwrap();
        assert!(signature.recovery_id <= 1);
        assert!(!signature.to_der().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_two_of_three_sign() {
        let dealt = deal(3, 2);
        let (network, parties) = signers(&dealt, &[0, 2], dealt.public_key);

        assert_eq!(run(&network, &parties).await, vec![State::Done; 2]);

        let signatures: Vec<Signature> =
            parties.iter().map(|(s, _)| s.result().unwrap()).collect();
        assert_eq!(signatures[0], signatures[1]);
        assert_valid(&signatures[0], &dealt.public_key);
    }

    #[tokio::test]
    async fn test_three_of_three_sign() {
        let dealt = deal(3, 3);
        let (network, parties) = signers(&dealt, &[0, 1, 2], dealt.public_key);

        assert_eq!(run(&network, &parties).await, vec![State::Done; 3]);
        let signature = parties[1].0.result().unwrap();
        assert_valid(&signature, &dealt.public_key);
    }

    #[tokio::test]
    async fn test_wrong_expected_key_fails_everywhere() {
        let dealt = deal(3, 2);
        let wrong = ProjectivePoint::GENERATOR * Scalar::from(42u64);
        let (network, parties) = signers(&dealt, &[0, 1], wrong);

        assert_eq!(run(&network, &parties).await, vec![State::Failed; 2]);
        for (signer, watcher) in &parties {
            assert_eq!(signer.result(), Err(Error::NotReady));
            assert_eq!(watcher.error(), Some(Error::InconsistentPublicKey));
        }
    }

    #[tokio::test]
    async fn test_skewed_share_fails_before_release() {
        let dealt = deal(3, 3);
        let (network, parties) =
            signers_with_cheater(&dealt, &[0, 1, 2], dealt.public_key, Some(1));
        for (signer, _) in &parties {
            signer.start().unwrap();
        }
        let recorders: Vec<Arc<Recorder>> = parties
            .iter()
            .map(|(signer, _)| {
                Arc::new(Recorder {
                    signer: signer.clone(),
                    seen: Mutex::new(Vec::new()),
                })
            })
            .collect();
        let targets = recorders
            .iter()
            .zip(&parties)
            .zip(network.ids())
            .map(|((recorder, (_, watcher)), id)| {
                let target: Arc<dyn MessageMain<SignMessage>> = recorder.clone();
                (id.clone(), target, watcher.clone())
            })
            .collect();

        assert_eq!(testing::drive(&network, targets).await, vec![State::Failed; 3]);
        for ((signer, watcher), recorder) in parties.iter().zip(&recorders) {
            assert!(matches!(watcher.error(), Some(Error::Inconsistent(_))));
            assert_eq!(signer.result(), Err(Error::NotReady));
            let seen = recorder.seen.lock().unwrap();
            assert!(seen.contains(&SignMessageType::DecommitUiTi));
            assert!(!seen.contains(&SignMessageType::Si));
        }
    }

    #[test]
    fn test_forged_share_proof_is_fatal() {
        let dealt = deal(3, 2);
        let (_network, parties) = signers(&dealt, &[0, 1], dealt.public_key);
        let (signer, watcher) = &parties[0];
        signer.start().unwrap();

        // Proof for one point attached to another
        let claimed = ProjectivePoint::GENERATOR * Scalar::from(7u64);
        let known = Scalar::from(8u64);
        let proof = SchnorrProof::prove(
            &mut OsRng,
            &known,
            &(ProjectivePoint::GENERATOR * known),
            b"anything",
        );
        let forged = SignMessage {
            id: "p1".into(),
            body: SignBody::Pubkey {
                point: encode_point(&claimed),
                proof,
            },
        };

        assert!(matches!(
            signer.handle_message(forged),
            Err(Error::VerificationFailed(_))
        ));
        assert_eq!(signer.state(), State::Failed);
        assert_eq!(watcher.current(), State::Failed);
        assert_eq!(signer.result(), Err(Error::NotReady));
    }

    #[test]
    fn test_preconditions() {
        let dealt = deal(3, 2);
        let network = MemoryNetwork::new(["p0", "p1"]);
        let pm = network.peer_manager::<SignMessage>("p0").unwrap();
        let homo: Arc<dyn HomoCrypto> = Arc::new(test_keys::paillier(0));
        let listener = Arc::new(StateWatcher::new());
        let bks: BTreeMap<PeerId, BkParameter> = [
            ("p0".to_string(), dealt.bks[0]),
            ("p1".to_string(), dealt.bks[1]),
        ]
        .into_iter()
        .collect();

        let new = |key: ProjectivePoint, bks: BTreeMap<PeerId, BkParameter>| {
            Signer::new(
                pm.clone(),
                key,
                homo.clone(),
                dealt.shares[0],
                bks,
                MESSAGE,
                listener.clone(),
            )
        };

        assert!(matches!(
            new(ProjectivePoint::IDENTITY, bks.clone()),
            Err(Error::IdentityPublicKey)
        ));

        let mut no_self = bks.clone();
        no_self.remove("p0");
        assert!(matches!(new(dealt.public_key, no_self), Err(Error::NoSelfBk)));

        let mut extra = bks.clone();
        extra.insert("p2".into(), dealt.bks[2]);
        assert!(matches!(
            new(dealt.public_key, extra),
            Err(Error::InconsistentPeerNumAndBks { bks: 3, peers: 1 })
        ));

        let signer = new(dealt.public_key, bks).unwrap();
        assert_eq!(signer.result(), Err(Error::NotReady));
        assert_eq!(signer.state(), State::Init);
    }
}
