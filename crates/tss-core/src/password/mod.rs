//! Password-authenticated share recovery
//!
//! A two-party protocol between a user and a server that jointly hold a key
//! with a 2-of-2 Birkhoff sharing. The user's share is the oblivious PRF of
//! the password under the server's OPRF key, so the user recovers it without
//! the server learning the password. Both sides then prove knowledge of their
//! share with an interactive Schnorr proof and check that the two share
//! points interpolate to the public key.

mod messages;
mod server;
mod user;

pub use messages::*;

use crate::birkhoff::{compute_bk_coefficients, is_identity, validate_public_key, BkParameter};
use crate::message::{MessageMain, MsgMain, Peers, State, StateChangedListener};
use crate::mpc::PeerManager;
use crate::oblivious::Responder;
use crate::{Error, PeerId, Result};
use k256::elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use server::{ServerHandler0, ServerHandler2};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};
use user::{UserHandler0, UserHandler1};

/// Shares needed to reconstruct the key: the user's and the server's
pub const PASSWORD_THRESHOLD: usize = 2;

/// Long-lived state both sides derive from the Birkhoff parameters
#[derive(Clone)]
pub(crate) struct Context {
    pub peer_manager: Arc<dyn PeerManager<PasswordMessage>>,
    pub public_key: ProjectivePoint,
    pub counterpart: PeerId,
    pub self_coefficient: Scalar,
}

impl Context {
    fn new(
        peer_manager: Arc<dyn PeerManager<PasswordMessage>>,
        public_key: ProjectivePoint,
        bks: &BTreeMap<PeerId, BkParameter>,
    ) -> Result<(Self, Peers<PasswordMessage>)> {
        if is_identity(&public_key) {
            return Err(Error::IdentityPublicKey);
        }
        let self_id = peer_manager.self_id().clone();
        if !bks.contains_key(&self_id) {
            return Err(Error::NoSelfBk);
        }
        let counterpart = match peer_manager.peer_ids().as_slice() {
            [only] => only.clone(),
            other => {
                return Err(Error::InvalidConfig(format!(
                    "password verification needs exactly one peer, got {}",
                    other.len()
                )))
            }
        };
        if bks.len() != PASSWORD_THRESHOLD || !bks.contains_key(&counterpart) {
            return Err(Error::InconsistentPeerNumAndBks {
                bks: bks.len(),
                peers: peer_manager.num_peers(),
            });
        }

        let params: Vec<BkParameter> = bks.values().copied().collect();
        let coefficients: BTreeMap<&PeerId, Scalar> = bks
            .keys()
            .zip(compute_bk_coefficients(&params, PASSWORD_THRESHOLD)?)
            .collect();
        let coefficient_of = |id: &PeerId| {
            coefficients
                .get(id)
                .copied()
                .ok_or_else(|| Error::Internal(format!("no coefficient for {}", id)))
        };

        let peers =
            Peers::with_coefficients([(counterpart.clone(), coefficient_of(&counterpart)?)]);
        let context = Self {
            self_coefficient: coefficient_of(&self_id)?,
            peer_manager,
            public_key,
            counterpart,
        };
        Ok((context, peers))
    }

    fn send(&self, body: PasswordBody) {
        self.peer_manager.must_send(
            &self.counterpart,
            &PasswordMessage {
                id: self.peer_manager.self_id().clone(),
                body,
            },
        );
    }

    /// `c_self·own + c_peer·counterpart == public key`
    fn validate(
        &self,
        peers: &Peers<PasswordMessage>,
        own: &ProjectivePoint,
        counterpart: &ProjectivePoint,
    ) -> Result<()> {
        let counterpart_coefficient = peers
            .get(&self.counterpart)
            .and_then(|peer| peer.coefficient())
            .ok_or_else(|| Error::UnknownPeer(self.counterpart.clone()))?;
        validate_public_key(
            &[self.self_coefficient, counterpart_coefficient],
            &[*own, *counterpart],
            &self.public_key,
        )
    }
}

/// Key material produced when a user registers a password with a server
#[derive(Debug, Clone)]
pub struct PasswordEnrollment {
    pub public_key: ProjectivePoint,
    pub bks: BTreeMap<PeerId, BkParameter>,
    pub oprf_key: Scalar,
    pub server_share: Scalar,
}

/// Derive a fresh key whose user share is the OPRF output of `password`
pub fn enroll<R: RngCore + CryptoRng>(
    rng: &mut R,
    password: &[u8],
    user_id: &str,
    server_id: &str,
) -> Result<PasswordEnrollment> {
    let responder = Responder::random(rng);
    let user_share = responder.evaluate(password)?;
    let server_share = Scalar::random(&mut *rng);

    let bks: BTreeMap<PeerId, BkParameter> = [
        (user_id.to_string(), BkParameter::new(Scalar::ONE, 0)),
        (server_id.to_string(), BkParameter::new(Scalar::from(2u64), 0)),
    ]
    .into_iter()
    .collect();
    let params: Vec<BkParameter> = bks.values().copied().collect();
    let shares: Vec<Scalar> = bks
        .keys()
        .map(|id| if id == user_id { user_share } else { server_share })
        .collect();
    let secret = compute_bk_coefficients(&params, PASSWORD_THRESHOLD)?
        .iter()
        .zip(&shares)
        .fold(Scalar::ZERO, |acc, (c, s)| acc + c * s);

    Ok(PasswordEnrollment {
        public_key: ProjectivePoint::GENERATOR * secret,
        bks,
        oprf_key: *responder.key(),
        server_share,
    })
}

/// Outcome on the user side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordUserResult {
    /// The recovered, verified user share
    pub share: Scalar,
}

/// Outcome on the server side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordServerResult {
    /// `share·G` of the user, proven and consistent with the public key
    pub user_share_point: ProjectivePoint,
}

/// User side of password verification
pub struct PasswordVerifier {
    engine: MsgMain<PasswordMessage>,
}

impl PasswordVerifier {
    #[instrument(skip_all, fields(peer = %peer_manager.self_id()))]
    pub fn new(
        peer_manager: Arc<dyn PeerManager<PasswordMessage>>,
        public_key: ProjectivePoint,
        bks: BTreeMap<PeerId, BkParameter>,
        password: &[u8],
        listener: Arc<dyn StateChangedListener>,
    ) -> Result<Self> {
        let (context, peers) = Context::new(peer_manager.clone(), public_key, &bks)?;
        let handler = UserHandler0::new(context, password)?;
        let engine = MsgMain::new(
            peer_manager,
            peers,
            listener,
            Box::new(handler),
            USER_MESSAGE_TYPES.to_vec(),
        )?;
        info!("Password verifier created");
        Ok(Self { engine })
    }

    /// Send the blinded password and begin accepting messages
    pub fn start(&self) -> Result<()> {
        self.engine.start()
    }

    pub fn state(&self) -> State {
        self.engine.state()
    }

    pub fn handle_message(&self, message: PasswordMessage) -> Result<()> {
        self.engine.handle_message(message)
    }

    pub fn result(&self) -> Result<PasswordUserResult> {
        self.engine
            .with_final_handler(|handler: &UserHandler1| PasswordUserResult {
                share: handler.share(),
            })
    }
}

impl MessageMain<PasswordMessage> for PasswordVerifier {
    fn handle_message(&self, message: PasswordMessage) -> Result<()> {
        self.engine.handle_message(message)
    }

    fn state(&self) -> State {
        self.engine.state()
    }
}

/// Server side of password verification
pub struct PasswordServer {
    engine: MsgMain<PasswordMessage>,
}

impl PasswordServer {
    #[instrument(skip_all, fields(peer = %peer_manager.self_id()))]
    pub fn new(
        peer_manager: Arc<dyn PeerManager<PasswordMessage>>,
        public_key: ProjectivePoint,
        bks: BTreeMap<PeerId, BkParameter>,
        oprf_key: Scalar,
        share: Scalar,
        listener: Arc<dyn StateChangedListener>,
    ) -> Result<Self> {
        let (context, peers) = Context::new(peer_manager.clone(), public_key, &bks)?;
        let handler = ServerHandler0::new(context, Responder::new(oprf_key)?, share);
        let engine = MsgMain::new(
            peer_manager,
            peers,
            listener,
            Box::new(handler),
            SERVER_MESSAGE_TYPES.to_vec(),
        )?;
        info!("Password server created");
        Ok(Self { engine })
    }

    /// The server waits for the user's request; nothing is sent on start
    pub fn start(&self) -> Result<()> {
        self.engine.start()
    }

    pub fn state(&self) -> State {
        self.engine.state()
    }

    pub fn handle_message(&self, message: PasswordMessage) -> Result<()> {
        self.engine.handle_message(message)
    }

    pub fn result(&self) -> Result<PasswordServerResult> {
        self.engine
            .with_final_handler(|handler: &ServerHandler2| PasswordServerResult {
                user_share_point: handler.user_share_point(),
            })
    }
}

impl MessageMain<PasswordMessage> for PasswordServer {
    fn handle_message(&self, message: PasswordMessage) -> Result<()> {
        self.engine.handle_message(message)
    }

    fn state(&self) -> State {
        self.engine.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::StateWatcher;
    use crate::mpc::{testing, MemoryNetwork};
    use rand::rngs::OsRng;

    const USER: &str = "user";
    const SERVER: &str = "server";

    struct Session {
        network: MemoryNetwork,
        verifier: Arc<PasswordVerifier>,
        server: Arc<PasswordServer>,
        watchers: [Arc<StateWatcher>; 2],
    }

    fn session(enrollment: &PasswordEnrollment, password: &[u8]) -> Session {
        let network = MemoryNetwork::new([USER, SERVER]);
        let watchers = [Arc::new(StateWatcher::new()), Arc::new(StateWatcher::new())];
        let verifier = PasswordVerifier::new(
            network.peer_manager::<PasswordMessage>(USER).unwrap(),
            enrollment.public_key,
            enrollment.bks.clone(),
            password,
            watchers[0].clone(),
        )
        .unwrap();
        let server = PasswordServer::new(
            network.peer_manager::<PasswordMessage>(SERVER).unwrap(),
            enrollment.public_key,
            enrollment.bks.clone(),
            enrollment.oprf_key,
            enrollment.server_share,
            watchers[1].clone(),
        )
        .unwrap();
        Session {
            network,
            verifier: Arc::new(verifier),
            server: Arc::new(server),
            watchers,
        }
    }

    async fn run(session: &Session) -> Vec<State> {
        session.server.start().unwrap();
        session.verifier.start().unwrap();
        let verifier: Arc<dyn MessageMain<PasswordMessage>> = session.verifier.clone();
        let server: Arc<dyn MessageMain<PasswordMessage>> = session.server.clone();
        let parties = vec![
            (USER.to_string(), verifier, session.watchers[0].clone()),
            (SERVER.to_string(), server, session.watchers[1].clone()),
        ];
        testing::drive(&session.network, parties).await
    }

    #[tokio::test]
    async fn test_correct_password_recovers_share() {
        let enrollment = enroll(&mut OsRng, b"hunter2", USER, SERVER).unwrap();
        let session = session(&enrollment, b"hunter2");

        assert_eq!(run(&session).await, vec![State::Done, State::Done]);

        let user = session.verifier.result().unwrap();
        let server = session.server.result().unwrap();
        assert_eq!(
            server.user_share_point,
            ProjectivePoint::GENERATOR * user.share
        );
        let expected = Responder::new(enrollment.oprf_key)
            .unwrap()
            .evaluate(b"hunter2")
            .unwrap();
        assert_eq!(user.share, expected);
    }

    #[tokio::test]
    async fn test_wrong_password_fails_consistency() {
        let enrollment = enroll(&mut OsRng, b"hunter2", USER, SERVER).unwrap();
        let session = session(&enrollment, b"hunter3");

        let states = run(&session).await;
        assert!(states.contains(&State::Failed));
        assert_eq!(session.verifier.result(), Err(Error::NotReady));
        assert_eq!(session.server.result(), Err(Error::NotReady));
        let errors: Vec<Option<Error>> = session.watchers.iter().map(|w| w.error()).collect();
        assert!(errors.contains(&Some(Error::InconsistentPublicKey)));
    }

    #[test]
    fn test_preconditions() {
        let enrollment = enroll(&mut OsRng, b"pw", USER, SERVER).unwrap();
        let network = MemoryNetwork::new([USER, SERVER]);
        let listener = Arc::new(StateWatcher::new());
        let pm = network.peer_manager::<PasswordMessage>(USER).unwrap();

        let identity = PasswordVerifier::new(
            pm.clone(),
            ProjectivePoint::IDENTITY,
            enrollment.bks.clone(),
            b"pw",
            listener.clone(),
        );
        assert!(matches!(identity, Err(Error::IdentityPublicKey)));

        let mut without_self = enrollment.bks.clone();
        without_self.remove(USER);
        let no_self = PasswordVerifier::new(
            pm.clone(),
            enrollment.public_key,
            without_self,
            b"pw",
            listener.clone(),
        );
        assert!(matches!(no_self, Err(Error::NoSelfBk)));

        let mut extra = enrollment.bks.clone();
        extra.insert("other".into(), BkParameter::new(Scalar::from(3u64), 0));
        let mismatched =
            PasswordVerifier::new(pm, enrollment.public_key, extra, b"pw", listener);
        assert!(matches!(
            mismatched,
            Err(Error::InconsistentPeerNumAndBks { bks: 3, peers: 1 })
        ));
    }
}
