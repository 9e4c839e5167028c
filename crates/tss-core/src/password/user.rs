//! User side: recover the share from the password and prove it

use super::messages::{PasswordBody, PasswordMessage, PasswordMessageType};
use super::Context;
use crate::message::{Advance, Handler, Peers};
use crate::oblivious::Requester;
use crate::zkproof::{InteractiveProver, InteractiveVerifier};
use crate::{Error, Result};
use k256::Scalar;
use rand::rngs::OsRng;
use tracing::debug;
use zeroize::Zeroize;

fn unexpected(round: &str) -> Error {
    Error::Internal(format!("unexpected message body in user {} round", round))
}

/// Waits for the OPRF evaluation and the server's Schnorr opening
pub(crate) struct UserHandler0 {
    context: Context,
    requester: Requester,
    /// Set once the server's message has been handled
    next: Option<UserHandler1>,
}

impl UserHandler0 {
    pub fn new(context: Context, password: &[u8]) -> Result<Self> {
        Ok(Self {
            requester: Requester::new(&mut OsRng, password)?,
            context,
            next: None,
        })
    }
}

impl Handler<PasswordMessage> for UserHandler0 {
    fn message_type(&self) -> PasswordMessageType {
        PasswordMessageType::Server0
    }

    fn required_count(&self) -> usize {
        1
    }

    fn handle(&mut self, _peers: &Peers<PasswordMessage>, message: &PasswordMessage) -> Result<()> {
        let PasswordBody::Server0 {
            password_response,
            server_g_prover1,
        } = &message.body
        else {
            return Err(unexpected("first"));
        };

        let share = self.requester.compute(password_response)?;
        let prover = InteractiveProver::new(&mut OsRng, share);
        let server_verifier = InteractiveVerifier::new(&mut OsRng, server_g_prover1)?;
        debug!("Recovered password share");

        self.context.send(PasswordBody::User1 {
            share_g_prover1: prover.first_message(),
            server_g_verifier1: server_verifier.challenge_message(),
        });
        self.next = Some(UserHandler1 {
            context: self.context.clone(),
            share,
            prover,
            server_verifier,
        });
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        _peers: &Peers<PasswordMessage>,
    ) -> Result<Advance<PasswordMessage>> {
        let next = self
            .next
            .ok_or_else(|| Error::Internal("server response never handled".into()))?;
        Ok(Advance::Next(Box::new(next)))
    }

    fn first_message(&self) -> Option<PasswordMessage> {
        Some(PasswordMessage {
            id: self.context.peer_manager.self_id().clone(),
            body: PasswordBody::User0 {
                password_request: self.requester.request(),
            },
        })
    }
}

/// Checks the server's proof, answers its challenge and validates the key
pub(crate) struct UserHandler1 {
    context: Context,
    share: Scalar,
    prover: InteractiveProver,
    server_verifier: InteractiveVerifier,
}

impl UserHandler1 {
    pub fn share(&self) -> Scalar {
        self.share
    }
}

impl Handler<PasswordMessage> for UserHandler1 {
    fn message_type(&self) -> PasswordMessageType {
        PasswordMessageType::Server1
    }

    fn required_count(&self) -> usize {
        1
    }

    fn handle(&mut self, _peers: &Peers<PasswordMessage>, message: &PasswordMessage) -> Result<()> {
        let PasswordBody::Server1 {
            share_g_verifier1,
            server_g_prover2,
        } = &message.body
        else {
            return Err(unexpected("second"));
        };

        self.server_verifier.verify(server_g_prover2)?;
        self.context.send(PasswordBody::User2 {
            share_g_prover2: self.prover.respond(share_g_verifier1),
        });
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        peers: &Peers<PasswordMessage>,
    ) -> Result<Advance<PasswordMessage>> {
        self.context.validate(
            peers,
            &self.prover.public_point(),
            &self.server_verifier.public_point(),
        )?;
        debug!("Password share consistent with public key");
        Ok(Advance::Done(self))
    }
}

impl Drop for UserHandler1 {
    fn drop(&mut self) {
        self.share.zeroize();
    }
}
