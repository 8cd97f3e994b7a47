use std::env;
use std::str::FromStr;

use chrono::FixedOffset;

use crate::errors::AppError;
use crate::models::OperatingHours;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CalendarBackend {
    Google,
    Local,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub clinic_name: String,
    pub utc_offset: FixedOffset,
    pub hours: OperatingHours,
    pub slot_minutes: i64,
    pub max_slots_shown: usize,
    pub gateway_timeout_secs: u64,
    pub session_ttl_minutes: i64,
    pub pricing_info: String,
    pub receptionist_phone: String,
    pub calendar_backend: CalendarBackend,
    pub calendar_id: String,
    pub google_access_token: String,
    pub database_url: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_whatsapp_number: String,
    /// Bearer token for the JSON webhook. Empty leaves it open.
    pub webhook_token: String,
    pub reminder_interval_secs: u64,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {v}"))),
        Err(_) => Ok(default),
    }
}

/// Parse `+05:30` / `-08:00` style offsets.
pub fn parse_utc_offset(s: &str) -> Result<FixedOffset, AppError> {
    let invalid = || AppError::Config(format!("invalid UTC offset: {s}"));
    let s = s.trim();
    let (sign, rest) = match s.chars().next() {
        Some('+') => (1, &s[1..]),
        Some('-') => (-1, &s[1..]),
        _ => return Err(invalid()),
    };
    let (h, m) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = h.parse().map_err(|_| invalid())?;
    let minutes: i32 = m.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let hours = match env::var("CLINIC_HOURS") {
            Ok(json) => OperatingHours::from_json(&json)
                .map_err(|e| AppError::Config(format!("CLINIC_HOURS: {e}")))?,
            Err(_) => OperatingHours::daily("10:00", "20:00")
                .map_err(|e| AppError::Config(e.to_string()))?,
        };

        let slot_minutes = parse_var("SLOT_MINUTES", 30i64)?;
        if slot_minutes <= 0 {
            return Err(AppError::Config("SLOT_MINUTES must be positive".to_string()));
        }

        let max_slots_shown = parse_var("MAX_SLOTS_SHOWN", 5usize)?;
        if max_slots_shown == 0 {
            return Err(AppError::Config("MAX_SLOTS_SHOWN must be at least 1".to_string()));
        }

        let calendar_backend = match var_or("CALENDAR_BACKEND", "local").to_lowercase().as_str() {
            "google" => CalendarBackend::Google,
            "local" => CalendarBackend::Local,
            other => return Err(AppError::Config(format!("unknown CALENDAR_BACKEND: {other}"))),
        };

        Ok(Self {
            port: parse_var("PORT", 3000)?,
            clinic_name: var_or("CLINIC_NAME", "Dental Lifeline"),
            utc_offset: parse_utc_offset(&var_or("CLINIC_UTC_OFFSET", "+05:30"))?,
            hours,
            slot_minutes,
            max_slots_shown,
            gateway_timeout_secs: parse_var("GATEWAY_TIMEOUT_SECS", 10)?,
            session_ttl_minutes: parse_var("SESSION_TTL_MINUTES", 30)?,
            pricing_info: var_or(
                "PRICING_INFO",
                "Consultation fees are confirmed at the front desk. Please ask our receptionist.",
            ),
            receptionist_phone: env::var("RECEPTIONIST_PHONE").unwrap_or_default(),
            calendar_backend,
            calendar_id: var_or("CALENDAR_ID", "primary"),
            google_access_token: env::var("GOOGLE_ACCESS_TOKEN").unwrap_or_default(),
            database_url: var_or("DATABASE_URL", "clinic.db"),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_whatsapp_number: env::var("TWILIO_WHATSAPP_NUMBER").unwrap_or_default(),
            webhook_token: env::var("WEBHOOK_TOKEN").unwrap_or_default(),
            reminder_interval_secs: parse_var("REMINDER_INTERVAL_SECS", 600)?,
        })
    }
}
