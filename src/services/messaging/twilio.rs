use anyhow::Context;
use async_trait::async_trait;

use super::MessagingProvider;

const WHATSAPP_PREFIX: &str = "whatsapp:";

/// WhatsApp delivery through Twilio's Messages API.
pub struct TwilioWhatsAppProvider {
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: reqwest::Client,
}

impl TwilioWhatsAppProvider {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            account_sid,
            auth_token,
            from_number,
            client: reqwest::Client::new(),
        }
    }
}

/// `+15551234567` → `whatsapp:+15551234567`; already-prefixed input is kept.
pub fn whatsapp_address(number: &str) -> String {
    if number.starts_with(WHATSAPP_PREFIX) {
        number.to_string()
    } else {
        format!("{WHATSAPP_PREFIX}{number}")
    }
}

/// Inverse of [`whatsapp_address`].
pub fn strip_whatsapp_prefix(address: &str) -> &str {
    address.strip_prefix(WHATSAPP_PREFIX).unwrap_or(address)
}

#[async_trait]
impl MessagingProvider for TwilioWhatsAppProvider {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let to = whatsapp_address(to);
        let from = whatsapp_address(&self.from_number);

        self.client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to.as_str()), ("From", from.as_str()), ("Body", body)])
            .send()
            .await
            .context("failed to send Twilio WhatsApp message")?
            .error_for_status()
            .context("Twilio API returned error")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whatsapp_address() {
        assert_eq!(whatsapp_address("+919876543210"), "whatsapp:+919876543210");
        assert_eq!(whatsapp_address("whatsapp:+919876543210"), "whatsapp:+919876543210");
    }

    #[test]
    fn test_strip_whatsapp_prefix() {
        assert_eq!(strip_whatsapp_prefix("whatsapp:+919876543210"), "+919876543210");
        assert_eq!(strip_whatsapp_prefix("+919876543210"), "+919876543210");
    }
}
