use log::{debug, info};
use reqwest::header::{HeaderMap, SET_COOKIE};
use reqwest::Client;
use serde_json::{json, Value};

use crate::endpoints::{rest_url, ONBOARDING_TASK_PATH};
use crate::error::{ClientError, Result};
use crate::request::{capture, Captured};
use crate::session::cookies::CredentialSet;

/// Hard ceiling on flow round trips; a healthy login converges in 4-6
const MAX_FLOW_STEPS: usize = 12;

/// Input to the interactive credential login
#[derive(Debug, Clone)]
pub struct FlowCredentials {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
}

/// The server-dictated subtasks this client understands. Each state
/// declares its legal successors so a surprising transition fails loudly
/// instead of submitting a payload the upstream never asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowState {
    Begin,
    JsInstrumentation,
    EnterUserIdentifier,
    EnterPassword,
    AccountDuplicationCheck,
    EmailVerification,
    TwoFactorChallenge,
    DenyLogin,
    Success,
}

impl FlowState {
    fn from_id(id: &str) -> Option<Self> {
        Some(match id {
            "LoginJsInstrumentationSubtask" => FlowState::JsInstrumentation,
            "LoginEnterUserIdentifierSSO" => FlowState::EnterUserIdentifier,
            "LoginEnterPassword" => FlowState::EnterPassword,
            "AccountDuplicationCheck" => FlowState::AccountDuplicationCheck,
            "LoginAcid" => FlowState::EmailVerification,
            "LoginTwoFactorAuthChallenge" => FlowState::TwoFactorChallenge,
            "DenyLoginSubtask" => FlowState::DenyLogin,
            "LoginSuccessSubtask" => FlowState::Success,
            _ => return None,
        })
    }

    fn id(&self) -> &'static str {
        match self {
            FlowState::Begin => "(start)",
            FlowState::JsInstrumentation => "LoginJsInstrumentationSubtask",
            FlowState::EnterUserIdentifier => "LoginEnterUserIdentifierSSO",
            FlowState::EnterPassword => "LoginEnterPassword",
            FlowState::AccountDuplicationCheck => "AccountDuplicationCheck",
            FlowState::EmailVerification => "LoginAcid",
            FlowState::TwoFactorChallenge => "LoginTwoFactorAuthChallenge",
            FlowState::DenyLogin => "DenyLoginSubtask",
            FlowState::Success => "LoginSuccessSubtask",
        }
    }

    fn successors(&self) -> &'static [FlowState] {
        match self {
            FlowState::Begin => &[FlowState::JsInstrumentation, FlowState::EnterUserIdentifier],
            FlowState::JsInstrumentation => &[FlowState::EnterUserIdentifier],
            FlowState::EnterUserIdentifier => &[
                FlowState::EnterPassword,
                FlowState::AccountDuplicationCheck,
                FlowState::DenyLogin,
            ],
            FlowState::EnterPassword => &[
                FlowState::AccountDuplicationCheck,
                FlowState::EmailVerification,
                FlowState::TwoFactorChallenge,
                FlowState::DenyLogin,
                FlowState::Success,
            ],
            FlowState::AccountDuplicationCheck => &[
                FlowState::EmailVerification,
                FlowState::TwoFactorChallenge,
                FlowState::DenyLogin,
                FlowState::Success,
            ],
            FlowState::EmailVerification => &[FlowState::DenyLogin, FlowState::Success],
            // terminal states; the flow errors or ends before asking
            FlowState::TwoFactorChallenge | FlowState::DenyLogin | FlowState::Success => &[],
        }
    }
}

/// Build the subtask-specific payload submitted back to the flow, or
/// refuse with a descriptive error for subtasks that cannot proceed
fn subtask_payload(state: FlowState, credentials: &FlowCredentials) -> Result<Value> {
    match state {
        FlowState::JsInstrumentation => Ok(json!({
            "subtask_id": state.id(),
            "js_instrumentation": { "response": "{}", "link": "next_link" },
        })),
        FlowState::EnterUserIdentifier => Ok(json!({
            "subtask_id": state.id(),
            "settings_list": {
                "settings": [{
                    "key": "user_identifier",
                    "response_data": { "text_data": { "result": credentials.username } },
                }],
                "link": "next_link",
            },
        })),
        FlowState::EnterPassword => Ok(json!({
            "subtask_id": state.id(),
            "enter_password": { "password": credentials.password, "link": "next_link" },
        })),
        FlowState::AccountDuplicationCheck => Ok(json!({
            "subtask_id": state.id(),
            "check_logged_in_account": { "link": "AccountDuplicationCheck_false" },
        })),
        FlowState::EmailVerification => match &credentials.email {
            Some(email) => Ok(json!({
                "subtask_id": state.id(),
                "enter_text": { "text": email, "link": "next_link" },
            })),
            None => Err(ClientError::Auth(
                "login requires email verification (LoginAcid) but no email was supplied"
                    .to_owned(),
            )),
        },
        FlowState::TwoFactorChallenge => Err(ClientError::Auth(
            "account has two-factor authentication enabled, which this client cannot complete"
                .to_owned(),
        )),
        FlowState::DenyLogin => {
            Err(ClientError::Auth("the upstream denied this login attempt".to_owned()))
        }
        FlowState::Begin | FlowState::Success => Err(ClientError::protocol(
            "no payload exists for a terminal flow state",
        )),
    }
}

/// Pull `name=value` pairs out of Set-Cookie response headers into the
/// credential set being assembled
fn absorb_cookies(headers: &HeaderMap, jar: &mut CredentialSet) {
    for raw in headers.get_all(SET_COOKIE) {
        let raw = match raw.to_str() {
            Ok(raw) => raw,
            Err(_) => continue,
        };
        let pair = raw.split(';').next().unwrap_or("");
        let mut parts = pair.splitn(2, '=');
        if let (Some(name), Some(value)) = (parts.next(), parts.next()) {
            let name = name.trim();
            if !name.is_empty() {
                jar.set(name, value.trim());
            }
        }
    }
}

/// Drives the multi-step credential login against the onboarding flow
/// endpoint, carrying the evolving flow token forward each round
pub(crate) struct LoginFlow<'a> {
    pub client: &'a Client,
    /// Guest-style headers; the flow runs anonymously until it succeeds
    pub headers: HeaderMap,
    pub credentials: &'a FlowCredentials,
}

impl<'a> LoginFlow<'a> {
    pub async fn run(self) -> Result<CredentialSet> {
        let task_url = rest_url(ONBOARDING_TASK_PATH);
        let mut jar = CredentialSet::default();
        let mut state = FlowState::Begin;
        let mut captured = self
            .post(
                &format!("{}?flow_name=login", task_url),
                json!({
                    "input_flow_data": {
                        "flow_context": {
                            "debug_overrides": {},
                            "start_location": { "location": "splash_screen" },
                        },
                    },
                }),
                state,
            )
            .await?;

        for _ in 0..MAX_FLOW_STEPS {
            absorb_cookies(&captured.headers, &mut jar);
            let body = captured.json()?;
            let flow_token = body["flow_token"]
                .as_str()
                .ok_or_else(|| ClientError::protocol("flow response carried no flow_token"))?
                .to_owned();
            let subtask_id = body["subtasks"][0]["subtask_id"].as_str();
            let next = match subtask_id {
                // an empty subtask list means the flow has nothing left
                // to ask for
                None => break,
                Some(id) => FlowState::from_id(id).ok_or_else(|| {
                    ClientError::Auth(format!("login flow reached unsupported subtask {}", id))
                })?,
            };
            if !state.successors().contains(&next) {
                return Err(ClientError::Auth(format!(
                    "unexpected login transition {} -> {}",
                    state.id(),
                    next.id()
                )));
            }
            if next == FlowState::Success {
                info!("credential login flow completed");
                break;
            }
            debug!("login flow advancing to {}", next.id());
            let payload = subtask_payload(next, self.credentials)?;
            captured = self
                .post(
                    &task_url,
                    json!({ "flow_token": flow_token, "subtask_inputs": [payload] }),
                    next,
                )
                .await?;
            state = next;
        }
        Ok(jar)
    }

    /// One flow round trip. Any non-2xx is fatal for the whole login
    async fn post(&self, url: &str, body: Value, state: FlowState) -> Result<Captured> {
        let response = self
            .client
            .post(url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await?;
        let captured = capture(response).await?;
        if !captured.code.is_success() {
            return Err(ClientError::Auth(format!(
                "login step {} failed with {}: {}",
                state.id(),
                captured.code,
                captured.body
            )));
        }
        Ok(captured)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    fn credentials(email: Option<&str>) -> FlowCredentials {
        FlowCredentials {
            username: "magpie_user".to_owned(),
            password: "hunter2".to_owned(),
            email: email.map(|e| e.to_owned()),
        }
    }

    #[test]
    fn subtask_ids_round_trip() {
        for id in [
            "LoginJsInstrumentationSubtask",
            "LoginEnterUserIdentifierSSO",
            "LoginEnterPassword",
            "AccountDuplicationCheck",
            "LoginAcid",
            "LoginTwoFactorAuthChallenge",
            "DenyLoginSubtask",
            "LoginSuccessSubtask",
        ]
        .iter()
        {
            let state = FlowState::from_id(id).expect(id);
            assert_eq!(&state.id(), id);
        }
        assert!(FlowState::from_id("ArkoseLogin").is_none());
    }

    #[test]
    fn identifier_payload_carries_the_username() {
        let payload =
            subtask_payload(FlowState::EnterUserIdentifier, &credentials(None)).unwrap();
        assert_eq!(
            payload["settings_list"]["settings"][0]["response_data"]["text_data"]["result"],
            "magpie_user"
        );
        assert_eq!(payload["subtask_id"], "LoginEnterUserIdentifierSSO");
    }

    #[test]
    fn password_payload_carries_the_password() {
        let payload = subtask_payload(FlowState::EnterPassword, &credentials(None)).unwrap();
        assert_eq!(payload["enter_password"]["password"], "hunter2");
    }

    #[test]
    fn two_factor_fails_immediately() {
        let error = subtask_payload(FlowState::TwoFactorChallenge, &credentials(None))
            .err()
            .unwrap();
        match error {
            ClientError::Auth(message) => assert!(message.contains("two-factor")),
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[test]
    fn email_verification_without_email_names_the_problem() {
        let error = subtask_payload(FlowState::EmailVerification, &credentials(None))
            .err()
            .unwrap();
        match error {
            ClientError::Auth(message) => assert!(message.contains("email")),
            other => panic!("expected auth error, got {:?}", other),
        }
        let payload =
            subtask_payload(FlowState::EmailVerification, &credentials(Some("a@b.c"))).unwrap();
        assert_eq!(payload["enter_text"]["text"], "a@b.c");
    }

    #[test]
    fn transitions_follow_declared_successors() {
        assert!(FlowState::Begin
            .successors()
            .contains(&FlowState::JsInstrumentation));
        assert!(FlowState::EnterPassword
            .successors()
            .contains(&FlowState::Success));
        // the flow never asks for a password before an identifier
        assert!(!FlowState::Begin.successors().contains(&FlowState::EnterPassword));
        assert!(!FlowState::EnterUserIdentifier
            .successors()
            .contains(&FlowState::JsInstrumentation));
    }

    #[test]
    fn set_cookie_headers_populate_the_jar() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("auth_token=tok; Path=/; Secure; HttpOnly"),
        );
        headers.append(SET_COOKIE, HeaderValue::from_static("ct0=csrf; Max-Age=3600"));
        let mut jar = CredentialSet::default();
        absorb_cookies(&headers, &mut jar);
        assert_eq!(jar.auth_token(), Some("tok"));
        assert_eq!(jar.csrf_token(), Some("csrf"));
        assert!(jar.is_authenticated());
    }
}
