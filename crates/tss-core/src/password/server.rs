//! Server side: evaluate the OPRF and check the user's share proof

use super::messages::{PasswordBody, PasswordMessage, PasswordMessageType};
use super::Context;
use crate::message::{Advance, Handler, Peers};
use crate::oblivious::Responder;
use crate::zkproof::{InteractiveProver, InteractiveVerifier};
use crate::{Error, Result};
use k256::{ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use tracing::debug;

fn unexpected(round: &str) -> Error {
    Error::Internal(format!("unexpected message body in server {} round", round))
}

fn missing(round: &str) -> Error {
    Error::Internal(format!("server {} round finalized before handling", round))
}

/// Answers the blinded password and opens a proof of the server share
pub(crate) struct ServerHandler0 {
    context: Context,
    responder: Responder,
    prover: InteractiveProver,
    handled: bool,
}

impl ServerHandler0 {
    pub fn new(context: Context, responder: Responder, share: Scalar) -> Self {
        Self {
            context,
            responder,
            prover: InteractiveProver::new(&mut OsRng, share),
            handled: false,
        }
    }
}

impl Handler<PasswordMessage> for ServerHandler0 {
    fn message_type(&self) -> PasswordMessageType {
        PasswordMessageType::User0
    }

    fn required_count(&self) -> usize {
        1
    }

    fn handle(&mut self, _peers: &Peers<PasswordMessage>, message: &PasswordMessage) -> Result<()> {
        let PasswordBody::User0 { password_request } = &message.body else {
            return Err(unexpected("first"));
        };

        let password_response = self.responder.respond(password_request)?;
        self.context.send(PasswordBody::Server0 {
            password_response,
            server_g_prover1: self.prover.first_message(),
        });
        self.handled = true;
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        _peers: &Peers<PasswordMessage>,
    ) -> Result<Advance<PasswordMessage>> {
        if !self.handled {
            return Err(missing("first"));
        }
        let this = *self;
        Ok(Advance::Next(Box::new(ServerHandler1 {
            context: this.context,
            prover: this.prover,
            share_verifier: None,
        })))
    }
}

/// Challenges the user's proof and answers the user's challenge
pub(crate) struct ServerHandler1 {
    context: Context,
    prover: InteractiveProver,
    share_verifier: Option<InteractiveVerifier>,
}

impl Handler<PasswordMessage> for ServerHandler1 {
    fn message_type(&self) -> PasswordMessageType {
        PasswordMessageType::User1
    }

    fn required_count(&self) -> usize {
        1
    }

    fn handle(&mut self, _peers: &Peers<PasswordMessage>, message: &PasswordMessage) -> Result<()> {
        let PasswordBody::User1 {
            share_g_prover1,
            server_g_verifier1,
        } = &message.body
        else {
            return Err(unexpected("second"));
        };

        let share_verifier = InteractiveVerifier::new(&mut OsRng, share_g_prover1)?;
        self.context.send(PasswordBody::Server1 {
            share_g_verifier1: share_verifier.challenge_message(),
            server_g_prover2: self.prover.respond(server_g_verifier1),
        });
        self.share_verifier = Some(share_verifier);
        Ok(())
    }

    fn finalize(
        self: Box<Self>,
        _peers: &Peers<PasswordMessage>,
    ) -> Result<Advance<PasswordMessage>> {
        let this = *self;
        let share_verifier = this.share_verifier.ok_or_else(|| missing("second"))?;
        Ok(Advance::Next(Box::new(ServerHandler2 {
            context: this.context,
            prover: this.prover,
            share_verifier,
        })))
    }
}

/// Verifies the user's response and the combined public key
pub(crate) struct ServerHandler2 {
    context: Context,
    prover: InteractiveProver,
    share_verifier: InteractiveVerifier,
}

impl ServerHandler2 {
    pub fn user_share_point(&self) -> ProjectivePoint {
        self.share_verifier.public_point()
    }
}

impl Handler<PasswordMessage> for ServerHandler2 {
    fn message_type(&self) -> PasswordMessageType {
        PasswordMessageType::User2
    }

    fn required_count(&self) -> usize {
        1
    }

    fn handle(&mut self, _peers: &Peers<PasswordMessage>, message: &PasswordMessage) -> Result<()> {
        let PasswordBody::User2 { share_g_prover2 } = &message.body else {
            return Err(unexpected("third"));
        };
        self.share_verifier.verify(share_g_prover2)
    }

    fn finalize(
        self: Box<Self>,
        peers: &Peers<PasswordMessage>,
    ) -> Result<Advance<PasswordMessage>> {
        self.context.validate(
            peers,
            &self.prover.public_point(),
            &self.share_verifier.public_point(),
        )?;
        debug!(user = %self.context.counterpart, "User share verified");
        Ok(Advance::Done(self))
    }
}
