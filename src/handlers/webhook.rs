use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;

use crate::errors::AppError;
use crate::services::messaging::twilio::strip_whatsapp_prefix;
use crate::state::AppState;

const WHATSAPP_WEBHOOK_PATH: &str = "/webhook/whatsapp";

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyMessage {
    pub reply: String,
}

/// Plain JSON entry point: one message in, the bot's reply out.
pub async fn message_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(message): Json<InboundMessage>,
) -> Result<Json<ReplyMessage>, AppError> {
    if !state.config.webhook_token.is_empty() {
        check_bearer(&state.config.webhook_token, &headers)?;
    }

    let from = message.from.trim();
    if from.is_empty() {
        return Err(AppError::BadRequest("`from` must not be empty".to_string()));
    }

    tracing::info!(from, text = %message.text, "incoming message");
    let reply = state.engine.handle_message(from, &message.text).await;
    Ok(Json(ReplyMessage { reply }))
}

fn check_bearer(token: &str, headers: &HeaderMap) -> Result<(), AppError> {
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match provided {
        Some(provided) if provided == token => Ok(()),
        _ => {
            tracing::warn!("rejected webhook call without a valid bearer token");
            Err(AppError::Unauthorized)
        }
    }
}

/// Twilio's signature: HMAC-SHA1 over the full webhook URL followed by every
/// posted parameter, sorted by name, as `name` + `value`.
pub fn twilio_signature(auth_token: &str, url: &str, params: &[(String, String)]) -> Option<String> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut data = url.to_string();
    for (key, value) in sorted {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(data.as_bytes());
    Some(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

fn validate_twilio_signature(
    auth_token: &str,
    headers: &HeaderMap,
    params: &[(String, String)],
) -> Result<(), AppError> {
    let signature = headers
        .get("x-twilio-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if signature.is_empty() {
        tracing::warn!("missing X-Twilio-Signature header");
        return Err(AppError::Unauthorized);
    }

    // Behind a proxy the public URL comes from the forwarded headers.
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let url = format!("{proto}://{host}{WHATSAPP_WEBHOOK_PATH}");

    match twilio_signature(auth_token, &url, params) {
        Some(expected) if expected == signature => Ok(()),
        _ => {
            tracing::warn!(url, "invalid Twilio signature");
            Err(AppError::Unauthorized)
        }
    }
}

fn form_value<'a>(params: &'a [(String, String)], name: &str) -> &'a str {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .unwrap_or("")
}

/// Twilio WhatsApp webhook. The reply is delivered through the messaging
/// provider and Twilio gets an empty TwiML document back.
pub async fn whatsapp_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    if !state.config.twilio_auth_token.is_empty() {
        validate_twilio_signature(&state.config.twilio_auth_token, &headers, &params)?;
    }

    let from = strip_whatsapp_prefix(form_value(&params, "From").trim()).to_string();
    let body = form_value(&params, "Body");
    if from.is_empty() {
        return Err(AppError::BadRequest("missing From".to_string()));
    }

    tracing::info!(from = %from, body, "incoming WhatsApp message");

    let reply = state.engine.handle_message(&from, body).await;
    if let Err(e) = state
        .messaging
        .send_message(&from, &reply)
        .await
        .map_err(|e| AppError::Messaging(format!("{e:#}")))
    {
        tracing::error!(from = %from, error = %e, "failed to send reply");
    }

    Ok(twiml_response())
}

fn twiml_response() -> Response {
    (
        [(header::CONTENT_TYPE, "application/xml")],
        "<Response></Response>",
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<(String, String)> {
        vec![
            ("From".to_string(), "whatsapp:+919876543210".to_string()),
            ("Body".to_string(), "Hi".to_string()),
            ("To".to_string(), "whatsapp:+14155238886".to_string()),
        ]
    }

    #[test]
    fn test_signature_ignores_param_order() {
        let url = "https://clinic.example.com/webhook/whatsapp";
        let mut reversed = params();
        reversed.reverse();
        assert_eq!(
            twilio_signature("secret", url, &params()),
            twilio_signature("secret", url, &reversed)
        );
        assert_ne!(
            twilio_signature("secret", url, &params()),
            twilio_signature("other", url, &params())
        );
    }

    #[test]
    fn test_validate_uses_forwarded_host() {
        let sig = twilio_signature("secret", "https://clinic.example.com/webhook/whatsapp", &params()).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-twilio-signature", sig.parse().unwrap());
        headers.insert("x-forwarded-host", "clinic.example.com".parse().unwrap());
        headers.insert(header::HOST, "127.0.0.1:3000".parse().unwrap());
        assert!(validate_twilio_signature("secret", &headers, &params()).is_ok());

        headers.remove("x-forwarded-host");
        assert!(matches!(
            validate_twilio_signature("secret", &headers, &params()),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_missing_signature_rejected() {
        let headers = HeaderMap::new();
        assert!(matches!(
            validate_twilio_signature("secret", &headers, &params()),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_check_bearer() {
        let mut headers = HeaderMap::new();
        assert!(check_bearer("s3cret", &headers).is_err());

        headers.insert(header::AUTHORIZATION, "Bearer wrong".parse().unwrap());
        assert!(check_bearer("s3cret", &headers).is_err());

        headers.insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
        assert!(check_bearer("s3cret", &headers).is_ok());
    }

    #[test]
    fn test_form_value() {
        let p = params();
        assert_eq!(form_value(&p, "Body"), "Hi");
        assert_eq!(form_value(&p, "MessageSid"), "");
    }
}
