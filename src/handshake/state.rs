use log::trace;
use crate::handshake::c0c1::{C0C1, HANDSHAKE_SIZE};
use crate::handshake::s0s1s2::{S0S1S2, C2};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for C0+C1 from client
    Uninitialized,

    /// Sent S0+S1+S2, waiting for C2
    SentS0S1S2,

    /// Received C2, handshake complete
    Done,

    /// Error occurred
    Failed,
}

impl HandshakeState {
    /// Check if handshake is complete
    pub fn is_done(&self) -> bool {
        *self == HandshakeState::Done
    }

    /// Check if handshake failed
    pub fn is_failed(&self) -> bool {
        *self == HandshakeState::Failed
    }
}

/// Outcome of feeding bytes into [`ServerHandshake`]
#[derive(Debug, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Not enough bytes yet
    NeedMore,

    /// S0+S1+S2 to write back to the client
    Reply(Vec<u8>),

    /// C2 verified; bytes past C2 already belong to the chunk stream
    Done { leftover: Vec<u8> },
}

/// Incremental server side of the handshake, driven by the reactor as bytes
/// arrive. Performs no I/O itself.
#[derive(Debug)]
pub struct ServerHandshake {
    state: HandshakeState,
    buffer: Vec<u8>,
    reply: Option<S0S1S2>,
}

impl Default for ServerHandshake {
    fn default() -> Self {
        ServerHandshake::new()
    }
}

impl ServerHandshake {
    pub fn new() -> Self {
        ServerHandshake {
            state: HandshakeState::Uninitialized,
            buffer: Vec::with_capacity(1 + HANDSHAKE_SIZE),
            reply: None,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<HandshakeStep> {
        if self.state.is_failed() || self.state.is_done() {
            return Err(Error::wrong_state(format!("handshake already {:?}", self.state)));
        }
        self.buffer.extend_from_slice(data);

        match self.advance() {
            Ok(step) => Ok(step),
            Err(e) => {
                self.state = HandshakeState::Failed;
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> Result<HandshakeStep> {
        match self.state {
            HandshakeState::Uninitialized => {
                if self.buffer.len() < 1 + HANDSHAKE_SIZE {
                    return Ok(HandshakeStep::NeedMore);
                }
                let c0c1 = C0C1::parse(&self.buffer)?;
                self.buffer.drain(..1 + HANDSHAKE_SIZE);

                let reply = S0S1S2::generate(&c0c1)?;
                let bytes = reply.encode()?;
                self.reply = Some(reply);
                self.state = HandshakeState::SentS0S1S2;
                trace!("Handshake: C0C1 received, replying S0S1S2");
                Ok(HandshakeStep::Reply(bytes))
            }
            HandshakeState::SentS0S1S2 => {
                if self.buffer.len() < HANDSHAKE_SIZE {
                    return Ok(HandshakeStep::NeedMore);
                }
                let reply = self
                    .reply
                    .as_ref()
                    .ok_or_else(|| Error::wrong_state("C2 before S0S1S2"))?;
                let c2 = C2::parse(&self.buffer)?;
                c2.validate(reply)?;

                let leftover = self.buffer.split_off(HANDSHAKE_SIZE);
                self.buffer.clear();
                self.state = HandshakeState::Done;
                trace!("Handshake: C2 verified");
                Ok(HandshakeStep::Done { leftover })
            }
            state => Err(Error::wrong_state(format!("handshake already {:?}", state))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_feed() {
        let c0c1 = C0C1::create_client();
        let bytes = c0c1.encode().unwrap();
        let mut handshake = ServerHandshake::new();

        assert_eq!(handshake.feed(&bytes[..700]).unwrap(), HandshakeStep::NeedMore);
        let reply = match handshake.feed(&bytes[700..]).unwrap() {
            HandshakeStep::Reply(reply) => reply,
            other => panic!("unexpected step {:?}", other),
        };
        assert_eq!(handshake.state(), HandshakeState::SentS0S1S2);

        let s0s1s2 = S0S1S2::parse(&reply).unwrap();
        s0s1s2.validate(&c0c1).unwrap();

        let mut c2 = C2::create_from_s1(&s0s1s2).encode().unwrap();
        c2.extend_from_slice(&[0x02, 0x00]);
        assert_eq!(handshake.feed(&c2[..100]).unwrap(), HandshakeStep::NeedMore);
        assert_eq!(
            handshake.feed(&c2[100..]).unwrap(),
            HandshakeStep::Done { leftover: vec![0x02, 0x00] }
        );
        assert!(handshake.state().is_done());
    }

    #[test]
    fn test_bad_c2_fails() {
        let mut handshake = ServerHandshake::new();
        handshake.feed(&C0C1::create_client().encode().unwrap()).unwrap();
        let result = handshake.feed(&vec![0u8; HANDSHAKE_SIZE]);
        assert!(matches!(result, Err(Error::ConnectFail(_))));
        assert!(handshake.state().is_failed());
        assert!(matches!(handshake.feed(&[]), Err(Error::WrongState(_))));
    }

    #[test]
    fn test_bad_version_fails() {
        let mut handshake = ServerHandshake::new();
        let mut bytes = C0C1::create_client().encode().unwrap();
        bytes[0] = 0x06;
        assert!(handshake.feed(&bytes).is_err());
    }
}
