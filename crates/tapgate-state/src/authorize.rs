//! Authorization workflow for an authenticated tag.
//!
//! The handshake is split across the two execution contexts: the tag-I/O
//! task obtains the tag's challenge (`Start`), the control task runs the
//! cloud round-trips and interprets the replies. Both sides step the same
//! state value through pure functions returning `Some(next)` on a
//! transition and `None` when there is nothing to do yet.

use tapgate_cloud::{
    AuthorizePart1Request, AuthorizePart1Response, AuthorizePart2Request, AuthorizePart2Response,
    CloudRequest, PendingResponse, Publisher, ResponseState,
};
use tapgate_core::{DnaStatus, KeySlot, TagUid, constants::CLOUD_REQUEST_TIMEOUT};
use tapgate_nfc::SecureElement;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub enum AuthorizeState {
    /// Ask the tag for its authentication challenge.
    Start,
    /// Challenge in hand, not yet forwarded.
    NtagChallenge { challenge: [u8; 16] },
    /// First round-trip in flight.
    AwaitCloudChallenge {
        response: PendingResponse<AuthorizePart1Response>,
    },
    /// Authority wants the handshake confirmed; second round-trip in
    /// flight.
    AwaitAuthPart2 {
        response: PendingResponse<AuthorizePart2Response>,
    },
    /// Access granted.
    Succeeded { session_id: String },
    /// Access denied by the authority.
    Rejected { message: String },
    /// The workflow died on a tag or cloud failure.
    Failed {
        status: Option<DnaStatus>,
        message: String,
    },
}

impl AuthorizeState {
    /// Whether the workflow has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuthorizeState::Succeeded { .. }
                | AuthorizeState::Rejected { .. }
                | AuthorizeState::Failed { .. }
        )
    }
}

/// Tag-context step: everything that talks to the secure element.
pub async fn step_on_tag<S: SecureElement>(
    state: &AuthorizeState,
    element: &mut S,
) -> Option<AuthorizeState> {
    match state {
        AuthorizeState::Start => {
            match element.authenticate_begin(KeySlot::Authorization).await {
                Ok(challenge) => Some(AuthorizeState::NtagChallenge { challenge }),
                Err(err) => {
                    warn!(%err, "authorize: challenge request failed");
                    Some(AuthorizeState::Failed {
                        status: err.tag_status(),
                        message: err.to_string(),
                    })
                }
            }
        }
        _ => None,
    }
}

/// Control-context step: everything that talks to the remote authority.
pub async fn step_on_control<P: Publisher>(
    state: &AuthorizeState,
    uid: TagUid,
    cloud: &CloudRequest<P>,
) -> Option<AuthorizeState> {
    match state {
        AuthorizeState::NtagChallenge { challenge } => {
            let request = AuthorizePart1Request {
                uid: uid.to_hex(),
                challenge: hex::encode(challenge),
            };
            let response = cloud.send_request(&request, CLOUD_REQUEST_TIMEOUT).await;
            Some(AuthorizeState::AwaitCloudChallenge { response })
        }

        AuthorizeState::AwaitCloudChallenge { response } => match response.poll() {
            ResponseState::Pending => None,
            ResponseState::Ready(AuthorizePart1Response::Authorized { session_id }) => {
                info!(%uid, "authorized");
                Some(AuthorizeState::Succeeded { session_id })
            }
            ResponseState::Ready(AuthorizePart1Response::Rejected { message }) => {
                info!(%uid, message, "rejected");
                Some(AuthorizeState::Rejected { message })
            }
            ResponseState::Ready(AuthorizePart1Response::AuthenticationPart2 { challenge }) => {
                debug!(%uid, "authority requests handshake confirmation");
                let request = AuthorizePart2Request {
                    uid: uid.to_hex(),
                    challenge,
                };
                let response = cloud.send_request(&request, CLOUD_REQUEST_TIMEOUT).await;
                Some(AuthorizeState::AwaitAuthPart2 { response })
            }
            ResponseState::Failed(err) => Some(AuthorizeState::Failed {
                status: None,
                message: err.to_string(),
            }),
        },

        AuthorizeState::AwaitAuthPart2 { response } => match response.poll() {
            ResponseState::Pending => None,
            ResponseState::Ready(AuthorizePart2Response::Authorized { session_id }) => {
                info!(%uid, "authorized after confirmation");
                Some(AuthorizeState::Succeeded { session_id })
            }
            ResponseState::Ready(AuthorizePart2Response::Rejected { message }) => {
                info!(%uid, message, "rejected after confirmation");
                Some(AuthorizeState::Rejected { message })
            }
            ResponseState::Failed(err) => Some(AuthorizeState::Failed {
                status: None,
                message: err.to_string(),
            }),
        },

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapgate_cloud::MockPublisher;
    use tapgate_core::AesKey;
    use tapgate_nfc::{MockSecureElement, SecureElement};
    use tapgate_pn532::SelectedTag;

    fn uid() -> TagUid {
        TagUid::new([0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66])
    }

    async fn selected_element() -> MockSecureElement {
        let mut element =
            MockSecureElement::with_keys(uid(), [AesKey::new([0xA5; 16]); 5]);
        element
            .select(&SelectedTag {
                target: 1,
                uid: uid().as_bytes().to_vec(),
            })
            .await
            .unwrap();
        element
    }

    #[tokio::test]
    async fn start_obtains_tag_challenge() {
        let mut element = selected_element().await;
        element.set_challenge([0x42; 16]);

        let next = step_on_tag(&AuthorizeState::Start, &mut element)
            .await
            .unwrap();
        let AuthorizeState::NtagChallenge { challenge } = next else {
            panic!("expected NtagChallenge");
        };
        assert_eq!(challenge, [0x42; 16]);
    }

    #[tokio::test]
    async fn challenge_is_published_as_part1_request() {
        let cloud = CloudRequest::new(MockPublisher::new());
        let state = AuthorizeState::NtagChallenge {
            challenge: [0x42; 16],
        };

        let next = step_on_control(&state, uid(), &cloud).await.unwrap();
        assert!(matches!(next, AuthorizeState::AwaitCloudChallenge { .. }));

        let payload = cloud.publisher().last_payload().unwrap();
        assert_eq!(payload["type"], "authorize-part1");
        assert_eq!(payload["uid"], "04112233445566");
        assert_eq!(payload["challenge"], hex::encode([0x42; 16]));
    }

    #[tokio::test]
    async fn pending_response_is_no_transition() {
        let cloud = CloudRequest::new(MockPublisher::new());
        let state = step_on_control(
            &AuthorizeState::NtagChallenge {
                challenge: [0x42; 16],
            },
            uid(),
            &cloud,
        )
        .await
        .unwrap();

        assert!(step_on_control(&state, uid(), &cloud).await.is_none());
    }

    #[tokio::test]
    async fn rejection_reaches_terminal_state() {
        let cloud = CloudRequest::new(MockPublisher::new());
        let state = step_on_control(
            &AuthorizeState::NtagChallenge {
                challenge: [0x42; 16],
            },
            uid(),
            &cloud,
        )
        .await
        .unwrap();

        cloud
            .handle_response(r#"{"requestId":1,"result":"rejected","message":"no booking"}"#)
            .unwrap();
        let next = step_on_control(&state, uid(), &cloud).await.unwrap();
        let AuthorizeState::Rejected { message } = next else {
            panic!("expected Rejected");
        };
        assert_eq!(message, "no booking");
    }

    #[tokio::test]
    async fn part2_round_trip_confirms_handshake() {
        let cloud = CloudRequest::new(MockPublisher::new());
        let state = step_on_control(
            &AuthorizeState::NtagChallenge {
                challenge: [0x42; 16],
            },
            uid(),
            &cloud,
        )
        .await
        .unwrap();

        cloud
            .handle_response(
                r#"{"requestId":1,"result":"authentication-part2","challenge":"deadbeefdeadbeefdeadbeefdeadbeef"}"#,
            )
            .unwrap();
        let state = step_on_control(&state, uid(), &cloud).await.unwrap();
        assert!(matches!(state, AuthorizeState::AwaitAuthPart2 { .. }));

        let payload = cloud.publisher().last_payload().unwrap();
        assert_eq!(payload["type"], "authorize-part2");
        assert_eq!(payload["challenge"], "deadbeefdeadbeefdeadbeefdeadbeef");

        cloud
            .handle_response(r#"{"requestId":2,"result":"authorized","sessionId":"s-77"}"#)
            .unwrap();
        let state = step_on_control(&state, uid(), &cloud).await.unwrap();
        let AuthorizeState::Succeeded { session_id } = state else {
            panic!("expected Succeeded");
        };
        assert_eq!(session_id, "s-77");
    }

    #[tokio::test]
    async fn cloud_failure_fails_the_workflow() {
        let publisher = MockPublisher::new();
        publisher.fail_publishes(true);
        let cloud = CloudRequest::new(publisher);

        let state = step_on_control(
            &AuthorizeState::NtagChallenge {
                challenge: [0x42; 16],
            },
            uid(),
            &cloud,
        )
        .await
        .unwrap();
        let next = step_on_control(&state, uid(), &cloud).await.unwrap();
        assert!(matches!(next, AuthorizeState::Failed { status: None, .. }));
    }
}
