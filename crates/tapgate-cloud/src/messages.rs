//! Typed request/response payloads exchanged with the remote authority.
//!
//! Every request serializes to a JSON object; the correlation layer embeds
//! `type` and `requestId` before publishing. Key material crosses this
//! boundary as lowercase hex strings and nowhere else.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tapgate_core::{AesKey, KeySlot, constants::KEY_SLOT_COUNT};

/// Binds a request type to its wire `type` string and response type.
pub trait TerminalRequest: Serialize {
    /// Value of the `type` field in the published payload.
    const TYPE: &'static str;

    type Response: DeserializeOwned + Clone + Send + 'static;
}

/// First half of the tag authorization handshake: the tag's authentication
/// challenge, forwarded for the authority to answer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizePart1Request {
    /// Tag UID, lowercase hex.
    pub uid: String,
    /// 16-byte tag challenge, lowercase hex.
    pub challenge: String,
}

impl TerminalRequest for AuthorizePart1Request {
    const TYPE: &'static str = "authorize-part1";
    type Response = AuthorizePart1Response;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum AuthorizePart1Response {
    /// Authority granted access directly.
    #[serde(rename_all = "camelCase")]
    Authorized { session_id: String },
    /// Authority denied access.
    #[serde(rename_all = "camelCase")]
    Rejected { message: String },
    /// Authority answered the tag challenge; the handshake continues with
    /// a second round-trip.
    #[serde(rename_all = "camelCase")]
    AuthenticationPart2 { challenge: String },
}

/// Second half of the handshake, echoing the authority's challenge answer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizePart2Request {
    pub uid: String,
    /// Authority challenge data being confirmed, lowercase hex.
    pub challenge: String,
}

impl TerminalRequest for AuthorizePart2Request {
    const TYPE: &'static str = "authorize-part2";
    type Response = AuthorizePart2Response;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum AuthorizePart2Response {
    #[serde(rename_all = "camelCase")]
    Authorized { session_id: String },
    #[serde(rename_all = "camelCase")]
    Rejected { message: String },
}

/// Request for the diversified key set of one blank tag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDiversificationRequest {
    pub uid: String,
}

impl TerminalRequest for KeyDiversificationRequest {
    const TYPE: &'static str = "key-diversification";
    type Response = KeyDiversificationResponse;
}

/// Diversified keys for all five slots, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDiversificationResponse {
    pub application_key: String,
    pub terminal_key: String,
    pub authorization_key: String,
    pub reserved1_key: String,
    pub reserved2_key: String,
}

impl KeyDiversificationResponse {
    /// Decode all keys, indexed by wire slot number.
    ///
    /// # Errors
    /// `MalformedResponse` if any key is not 32 hex characters.
    pub fn keys(&self) -> Result<[AesKey; KEY_SLOT_COUNT]> {
        let decode = |slot: KeySlot, hex: &str| {
            AesKey::from_hex(hex)
                .map_err(|e| CloudError::MalformedResponse(format!("{slot} key: {e}")))
        };
        Ok([
            decode(KeySlot::Application, &self.application_key)?,
            decode(KeySlot::Terminal, &self.terminal_key)?,
            decode(KeySlot::Authorization, &self.authorization_key)?,
            decode(KeySlot::Reserved1, &self.reserved1_key)?,
            decode(KeySlot::Reserved2, &self.reserved2_key)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_part1_response_variants_decode() {
        let authorized: AuthorizePart1Response =
            serde_json::from_str(r#"{"result":"authorized","sessionId":"s-1"}"#).unwrap();
        assert_eq!(
            authorized,
            AuthorizePart1Response::Authorized {
                session_id: "s-1".into()
            }
        );

        let rejected: AuthorizePart1Response =
            serde_json::from_str(r#"{"result":"rejected","message":"no booking"}"#).unwrap();
        assert_eq!(
            rejected,
            AuthorizePart1Response::Rejected {
                message: "no booking".into()
            }
        );

        let part2: AuthorizePart1Response = serde_json::from_str(
            r#"{"result":"authentication-part2","challenge":"00112233445566778899aabbccddeeff"}"#,
        )
        .unwrap();
        assert!(matches!(
            part2,
            AuthorizePart1Response::AuthenticationPart2 { .. }
        ));
    }

    #[test]
    fn key_diversification_decodes_all_slots() {
        let response = KeyDiversificationResponse {
            application_key: "00000000000000000000000000000001".into(),
            terminal_key: "00000000000000000000000000000002".into(),
            authorization_key: "00000000000000000000000000000003".into(),
            reserved1_key: "00000000000000000000000000000004".into(),
            reserved2_key: "00000000000000000000000000000005".into(),
        };

        let keys = response.keys().unwrap();
        assert_eq!(keys[KeySlot::Application.as_u8() as usize].to_hex().chars().last(), Some('1'));
        assert_eq!(keys[KeySlot::Reserved2.as_u8() as usize].to_hex().chars().last(), Some('5'));
    }

    #[test]
    fn key_diversification_rejects_short_key() {
        let response = KeyDiversificationResponse {
            application_key: "0011".into(),
            terminal_key: "00000000000000000000000000000002".into(),
            authorization_key: "00000000000000000000000000000003".into(),
            reserved1_key: "00000000000000000000000000000004".into(),
            reserved2_key: "00000000000000000000000000000005".into(),
        };
        assert!(matches!(
            response.keys(),
            Err(CloudError::MalformedResponse(_))
        ));
    }
}
