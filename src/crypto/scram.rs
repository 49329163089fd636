//! SCRAM-SHA-256 authenticator (RFC 5802, SHA-256 profile from RFC 7677).
//!
//! Channel binding is declared "not supported by client" (GS2 header
//! `n,,`) — secure against downgrade only because SCRAM-SHA-256 without
//! `-PLUS` is an accepted mechanism. A client wanting channel-bound modes
//! would need to extend this state machine and renegotiate.
use base64::Engine;
use rand::RngCore;

use crate::error::ErrorKind;
use crate::Result;

use super::{hmac_sha256, pbkdf2_hmac_sha256, sha256};

const GS2_HEADER: &str = "n,,";

fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn b64_decode(data: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|_| ErrorKind::ServerError("malformed SASL message (invalid base64)".into()).into())
}

/// RFC 4013 SASLprep (stored-strings profile), applied to usernames and
/// passwords before they enter the SCRAM exchange. `=` and `,` in the
/// normalized username are additionally escaped as `=3D`/`=2C` so the
/// `n=` attribute stays parseable.
fn saslprep(s: &str) -> Result<String> {
    stringprep::saslprep(s).map(|s| s.into_owned()).map_err(|_| ErrorKind::InvalidUsernameString.into())
}

fn escape_saslname(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}

/// State of an in-progress SCRAM-SHA-256 exchange.
enum State {
    Start,
    SentClientFirst {
        client_nonce: String,
        client_first_bare: String,
        password: String,
    },
    ReceivedServerFirst {
        expected_server_signature: [u8; 32],
    },
    Done,
}

pub struct ScramSha256 {
    state: State,
}

impl ScramSha256 {
    pub fn new() -> Self {
        Self { state: State::Start }
    }

    fn client_nonce() -> String {
        let mut bytes = [0u8; 18];
        rand::thread_rng().fill_bytes(&mut bytes);
        b64(&bytes)
    }

    /// Build `client-first-message` and `SASLInitialResponse` payload.
    /// `nonce_override` exists purely for deterministic tests (RFC 7677
    /// vectors pin the client nonce).
    pub fn client_first(&mut self, user: &str, password: &str, nonce_override: Option<&str>) -> Result<String> {
        if !matches!(self.state, State::Start) {
            return Err(ErrorKind::ServerError("SCRAM exchange already started".into()).into());
        }

        let user = saslprep(user)?;
        let client_nonce = nonce_override.map(str::to_owned).unwrap_or_else(Self::client_nonce);
        let client_first_bare = format!("n={},r={}", escape_saslname(&user), client_nonce);
        let client_first_message = format!("{GS2_HEADER}{client_first_bare}");

        self.state = State::SentClientFirst {
            client_nonce,
            client_first_bare,
            password: saslprep(password).map_err(|_| ErrorKind::InvalidPasswordString)?,
        };

        Ok(client_first_message)
    }

    /// Consume `server-first-message`, returning `client-final-message`.
    pub fn client_final(&mut self, server_first_message: &str) -> Result<String> {
        let State::SentClientFirst { client_nonce, client_first_bare, password } =
            std::mem::replace(&mut self.state, State::Done)
        else {
            return Err(ErrorKind::ServerError("SCRAM exchange not awaiting server-first".into()).into());
        };

        let mut parts = server_first_message.split(',');
        let server_nonce = parts
            .next()
            .and_then(|p| p.strip_prefix("r="))
            .filter(|nonce| nonce.starts_with(&client_nonce))
            .ok_or_else(|| ErrorKind::ServerError("malformed SASL message (bad nonce)".into()))?;
        let salt_b64 = parts
            .next()
            .and_then(|p| p.strip_prefix("s="))
            .ok_or_else(|| ErrorKind::ServerError("malformed SASL message (missing salt)".into()))?;
        let iterations: u32 = parts
            .next()
            .and_then(|p| p.strip_prefix("i="))
            .and_then(|i| i.parse().ok())
            .filter(|i| *i > 0)
            .ok_or_else(|| ErrorKind::ServerError("malformed SASL message (bad iteration count)".into()))?;
        if parts.next().is_some() {
            return Err(ErrorKind::ServerError("malformed SASL message (trailing data)".into()).into());
        }

        let salt = b64_decode(salt_b64)?;
        let salted_password = pbkdf2_hmac_sha256(password.as_bytes(), &salt, iterations);
        let client_key = hmac_sha256(&salted_password, b"Client Key");
        let stored_key = sha256(&client_key);
        let server_key = hmac_sha256(&salted_password, b"Server Key");

        let channel_binding = b64(GS2_HEADER.as_bytes());
        let client_final_without_proof = format!("c={channel_binding},r={server_nonce}");
        let auth_message = format!("{client_first_bare},{server_first_message},{client_final_without_proof}");

        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes());
        let mut client_proof = client_key;
        for (proof, signature) in client_proof.iter_mut().zip(client_signature) {
            *proof ^= signature;
        }

        let expected_server_signature = hmac_sha256(&server_key, auth_message.as_bytes());
        self.state = State::ReceivedServerFirst { expected_server_signature };

        Ok(format!("{client_final_without_proof},p={}", b64(&client_proof)))
    }

    /// Validate `server-final-message`, completing the exchange.
    pub fn verify_server_final(&mut self, server_final_message: &str) -> Result<()> {
        let State::ReceivedServerFirst { expected_server_signature } =
            std::mem::replace(&mut self.state, State::Done)
        else {
            return Err(ErrorKind::ServerError("SCRAM exchange not awaiting server-final".into()).into());
        };

        let signature = server_final_message
            .strip_prefix("v=")
            .ok_or_else(|| ErrorKind::ServerError("malformed SASL message (missing verifier)".into()))?;
        let signature = b64_decode(signature)?;

        if signature != expected_server_signature {
            return Err(ErrorKind::ServerError("incorrect verifier".into()).into());
        }

        Ok(())
    }
}

impl Default for ScramSha256 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RFC 7677 worked example.
    #[test]
    fn rfc7677_vector() {
        let mut scram = ScramSha256::new();
        let client_first = scram
            .client_first("user", "pencil", Some("rOprNGfwEbeRWgbNEkqO"))
            .unwrap();
        assert_eq!(client_first, "n,,n=user,r=rOprNGfwEbeRWgbNEkqO");

        let server_first = "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
                             s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
        let client_final = scram.client_final(server_first).unwrap();

        assert!(client_final.contains("p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="));
    }

    #[test]
    fn rejects_nonce_not_prefixed_by_client_nonce() {
        let mut scram = ScramSha256::new();
        scram.client_first("user", "pencil", Some("clientnonce")).unwrap();
        let err = scram.client_final("r=not-the-nonce,s=AAAA,i=4096").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ServerError(_)));
    }

    #[test]
    fn rejects_zero_iteration_count() {
        let mut scram = ScramSha256::new();
        scram.client_first("user", "pencil", Some("n1")).unwrap();
        let err = scram.client_final("r=n1xyz,s=AAAA,i=0").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ServerError(_)));
    }
}
