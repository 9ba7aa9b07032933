//! The `auth` module is the seam to an external post-quantum
//! signature/KEM library used to authenticate protocol messages. The
//! OPRF core only consumes the capabilities below and never depends on
//! the algorithm behind them; a deployment plugs in its own bindings.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use thiserror::Error;

/// Errors raised at the authentication boundary.
#[derive(Debug, Error)]
pub enum AuthError {
  #[error("signature verification failed")]
  InvalidSignature,
  #[error("decapsulation failed")]
  Decapsulation,
  #[error("message encoding failed: {0}")]
  Encoding(#[from] bincode::Error),
}

/// Produces a signature over raw message bytes.
pub trait Signer {
  fn sign(&self, message: &[u8]) -> Vec<u8>;
}

/// Checks a signature over raw message bytes.
pub trait Verifier {
  fn verify(&self, message: &[u8], signature: &[u8]) -> bool;
}

/// Key encapsulation: `encapsulate` returns `(ciphertext,
/// shared_secret)`, `decapsulate` recovers the shared secret from the
/// ciphertext on the other side.
pub trait Kem {
  fn encapsulate(&mut self) -> Result<(Vec<u8>, Vec<u8>), AuthError>;
  fn decapsulate(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, AuthError>;
}

/// A signed envelope around a protocol message. The payload is the
/// bincode encoding of the message; the signature covers exactly those
/// bytes, so what is verified is what is decoded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Signed<M> {
  payload: Vec<u8>,
  signature: Vec<u8>,
  #[serde(skip)]
  _message: PhantomData<M>,
}

impl<M: Serialize + DeserializeOwned> Signed<M> {
  pub fn seal(message: &M, signer: &impl Signer) -> Result<Self, AuthError> {
    let payload = bincode::serialize(message)?;
    let signature = signer.sign(&payload);
    Ok(Self {
      payload,
      signature,
      _message: PhantomData,
    })
  }

  pub fn open(&self, verifier: &impl Verifier) -> Result<M, AuthError> {
    if !verifier.verify(&self.payload, &self.signature) {
      return Err(AuthError::InvalidSignature);
    }
    Ok(bincode::deserialize(&self.payload)?)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use sha2::{Digest, Sha256};

  /// Keyed-hash stand-in for the external signature library.
  struct StubAuthenticator {
    key: Vec<u8>,
  }

  impl StubAuthenticator {
    fn tag(&self, message: &[u8]) -> Vec<u8> {
      let mut h = Sha256::new();
      h.update(&self.key);
      h.update(message);
      h.update(&self.key);
      h.finalize().to_vec()
    }
  }

  impl Signer for StubAuthenticator {
    fn sign(&self, message: &[u8]) -> Vec<u8> {
      self.tag(message)
    }
  }

  impl Verifier for StubAuthenticator {
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
      self.tag(message) == signature
    }
  }

  struct StubKem;

  impl Kem for StubKem {
    fn encapsulate(&mut self) -> Result<(Vec<u8>, Vec<u8>), AuthError> {
      let ciphertext = b"stub ciphertext".to_vec();
      let secret = Sha256::digest(&ciphertext).to_vec();
      Ok((ciphertext, secret))
    }

    fn decapsulate(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, AuthError> {
      Ok(Sha256::digest(ciphertext).to_vec())
    }
  }

  #[test]
  fn sealed_messages_open_again() {
    let auth = StubAuthenticator {
      key: b"stub key".to_vec(),
    };
    let message = vec![1u8, 2, 3, 4];
    let sealed = Signed::seal(&message, &auth).unwrap();
    assert_eq!(sealed.open(&auth).unwrap(), message);
  }

  #[test]
  fn tampering_invalidates_the_signature() {
    let auth = StubAuthenticator {
      key: b"stub key".to_vec(),
    };
    let message = vec![1u8, 2, 3, 4];
    let mut sealed = Signed::seal(&message, &auth).unwrap();
    sealed.payload[0] ^= 1;
    assert!(matches!(
      sealed.open(&auth),
      Err(AuthError::InvalidSignature)
    ));

    let other = StubAuthenticator {
      key: b"different key".to_vec(),
    };
    let sealed = Signed::seal(&message, &auth).unwrap();
    assert!(matches!(
      sealed.open(&other),
      Err(AuthError::InvalidSignature)
    ));
  }

  #[test]
  fn kem_shared_secrets_agree() {
    let mut kem = StubKem;
    let (ciphertext, secret) = kem.encapsulate().unwrap();
    assert_eq!(kem.decapsulate(&ciphertext).unwrap(), secret);
  }
}
