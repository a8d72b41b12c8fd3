use chrono::Utc;
use md5::{Digest, Md5};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

// EMV merchant-presented QR field ids
const ID_PAYLOAD_FORMAT: &str = "00";
const ID_POINT_OF_INITIATION: &str = "01";
const ID_MERCHANT_ACCOUNT: &str = "29";
const ID_MERCHANT_CATEGORY_CODE: &str = "52";
const ID_CURRENCY: &str = "53";
const ID_AMOUNT: &str = "54";
const ID_COUNTRY_CODE: &str = "58";
const ID_MERCHANT_NAME: &str = "59";
const ID_MERCHANT_CITY: &str = "60";
const ID_ADDITIONAL_DATA: &str = "62";
const ID_CRC: &str = "63";

// sub-ids inside templates 29 and 62
const SUB_ACCOUNT_ID: &str = "00";
const SUB_BILL_NUMBER: &str = "01";
const SUB_STORE_LABEL: &str = "03";
const SUB_TERMINAL_LABEL: &str = "07";

const MCC_MISC_STORES: &str = "5999";
const COUNTRY_KH: &str = "KH";

const MAX_MERCHANT_NAME: usize = 25;
const MAX_MERCHANT_CITY: usize = 15;

/// Merchant identity presented inside every QR payload.
#[derive(Debug, Clone)]
pub struct MerchantConfig {
    pub bakong_account_id: String,
    pub merchant_name: String,
    pub merchant_city: String,
    pub currency: String,
    pub store_label: String,
    pub terminal_label: String,
}

impl MerchantConfig {
    pub fn from_env() -> AppResult<Self> {
        let bakong_account_id = require_env("BAKONG_ACCOUNT_ID")?;
        let merchant_name = require_env("MERCHANT_NAME")?;
        let merchant_city = require_env("MERCHANT_CITY")?;
        let currency = dotenv::var("MERCHANT_CURRENCY").unwrap_or("USD".to_string());
        let store_label = dotenv::var("STORE_LABEL").unwrap_or("Digital Store".to_string());
        let terminal_label = dotenv::var("TERMINAL_LABEL").unwrap_or("Web Store".to_string());

        let config = Self {
            bakong_account_id,
            merchant_name,
            merchant_city,
            currency,
            store_label,
            terminal_label,
        };
        // reject unknown currencies up front rather than on the first checkout
        config.currency_numeric()?;
        Ok(config)
    }

    fn currency_numeric(&self) -> AppResult<&'static str> {
        match self.currency.as_str() {
            "USD" => Ok("840"),
            "KHR" => Ok("116"),
            _ => Err(AppError::MerchantConfigMissing("MERCHANT_CURRENCY")),
        }
    }
}

fn require_env(key: &'static str) -> AppResult<String> {
    match dotenv::var(key) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(AppError::MerchantConfigMissing(key)),
    }
}

/// A freshly minted payment intent: scannable payload plus its fingerprint.
/// Persisting it is the caller's job.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub bill_number: String,
    pub qr_payload: String,
    pub checksum: String,
    pub amount: Decimal,
    pub currency: String,
}

pub fn generate_intent(config: &MerchantConfig, amount: Decimal) -> AppResult<PaymentIntent> {
    validate_amount(amount)?;

    let bill_number = mint_bill_number();
    let qr_payload = build_payload(config, amount, &bill_number)?;
    let checksum = fingerprint(&qr_payload);

    Ok(PaymentIntent {
        bill_number,
        qr_payload,
        checksum,
        amount,
        currency: config.currency.clone(),
    })
}

pub fn validate_amount(amount: Decimal) -> AppResult<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::InvalidAmount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    if amount.normalize().scale() > 2 {
        return Err(AppError::InvalidAmount(format!(
            "amount must have at most 2 decimal digits, got {amount}"
        )));
    }
    Ok(())
}

// time prefix keeps references sortable, the uuid suffix makes collisions
// a non-issue at storefront volume; the unique index is the backstop
fn mint_bill_number() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("KH-{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}

fn build_payload(config: &MerchantConfig, amount: Decimal, bill_number: &str) -> AppResult<String> {
    let currency_code = config.currency_numeric()?;

    let merchant_account = field(SUB_ACCOUNT_ID, &config.bakong_account_id);

    let mut additional_data = String::new();
    additional_data.push_str(&field(SUB_BILL_NUMBER, bill_number));
    additional_data.push_str(&field(SUB_STORE_LABEL, &config.store_label));
    additional_data.push_str(&field(SUB_TERMINAL_LABEL, &config.terminal_label));

    let mut payload = String::new();
    payload.push_str(&field(ID_PAYLOAD_FORMAT, "01"));
    payload.push_str(&field(ID_POINT_OF_INITIATION, "12"));
    payload.push_str(&field(ID_MERCHANT_ACCOUNT, &merchant_account));
    payload.push_str(&field(ID_MERCHANT_CATEGORY_CODE, MCC_MISC_STORES));
    payload.push_str(&field(ID_CURRENCY, currency_code));
    payload.push_str(&field(ID_AMOUNT, &amount.normalize().to_string()));
    payload.push_str(&field(ID_COUNTRY_CODE, COUNTRY_KH));
    payload.push_str(&field(
        ID_MERCHANT_NAME,
        truncated(&config.merchant_name, MAX_MERCHANT_NAME),
    ));
    payload.push_str(&field(
        ID_MERCHANT_CITY,
        truncated(&config.merchant_city, MAX_MERCHANT_CITY),
    ));
    payload.push_str(&field(ID_ADDITIONAL_DATA, &additional_data));

    // CRC covers everything up to and including its own id + length
    payload.push_str(ID_CRC);
    payload.push_str("04");
    let crc = crc16_ccitt(payload.as_bytes());
    payload.push_str(&format!("{crc:04X}"));

    Ok(payload)
}

fn field(id: &str, value: &str) -> String {
    format!("{id}{:02}{value}", value.len())
}

fn truncated(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

// CRC-16/CCITT-FALSE, the variant EMV QR mandates
fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

pub fn fingerprint(payload: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn test_config() -> MerchantConfig {
        MerchantConfig {
            bakong_account_id: "merchant_demo@devb".to_string(),
            merchant_name: "DEMO MERCHANT".to_string(),
            merchant_city: "Phnom Penh".to_string(),
            currency: "USD".to_string(),
            store_label: "Digital Store".to_string(),
            terminal_label: "Web Store".to_string(),
        }
    }

    #[test]
    fn crc_known_vector() {
        assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
    }

    #[test]
    fn payload_is_well_formed_emv() {
        let config = test_config();
        let payload = build_payload(&config, Decimal::new(1099, 2), "KH-1-abcd1234").unwrap();

        assert!(payload.starts_with("000201"));
        assert!(payload.contains("010212"));
        assert!(payload.contains("merchant_demo@devb"));
        assert!(payload.contains("DEMO MERCHANT"));
        assert!(payload.contains("KH-1-abcd1234"));
        assert!(payload.contains("5303840"));
        assert!(payload.contains("540510.99"));

        // trailing CRC must verify over everything before it
        let (body, crc_hex) = payload.split_at(payload.len() - 4);
        assert!(body.ends_with("6304"));
        let expected = u16::from_str_radix(crc_hex, 16).unwrap();
        assert_eq!(crc16_ccitt(body.as_bytes()), expected);
    }

    #[test]
    fn khr_currency_uses_numeric_116() {
        let mut config = test_config();
        config.currency = "KHR".to_string();
        let payload = build_payload(&config, Decimal::new(4000, 0), "KH-1-ffff0000").unwrap();
        assert!(payload.contains("5303116"));
    }

    #[test]
    fn unknown_currency_is_a_config_error() {
        let mut config = test_config();
        config.currency = "EUR".to_string();
        let err = generate_intent(&config, Decimal::ONE).unwrap_err();
        assert!(matches!(err, AppError::MerchantConfigMissing(_)));
    }

    #[test]
    fn fingerprint_is_md5_hex() {
        let sum = fingerprint("000201");
        assert_eq!(sum.len(), 32);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit()));
        // stable for identical payloads
        assert_eq!(sum, fingerprint("000201"));
    }

    #[test]
    fn zero_and_negative_amounts_rejected() {
        let config = test_config();
        for bad in [Decimal::ZERO, Decimal::new(-5, 0)] {
            let err = generate_intent(&config, bad).unwrap_err();
            assert!(matches!(err, AppError::InvalidAmount(_)), "amount {bad}");
        }
    }

    #[test]
    fn sub_cent_precision_rejected() {
        let err = validate_amount(Decimal::new(1999, 3)).unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount(_)));
        // trailing zeros are not precision
        assert!(validate_amount(Decimal::new(2500, 3)).is_ok());
    }

    #[test]
    fn hundred_bill_numbers_are_pairwise_distinct() {
        let config = test_config();
        let bills: HashSet<String> = (0..100)
            .map(|_| generate_intent(&config, Decimal::new(1099, 2)).unwrap().bill_number)
            .collect();
        assert_eq!(bills.len(), 100);
    }

    #[test]
    fn bill_numbers_carry_time_prefix_and_random_suffix() {
        let config = test_config();
        let intent = generate_intent(&config, Decimal::ONE).unwrap();
        let parts: Vec<&str> = intent.bill_number.splitn(3, '-').collect();
        assert_eq!(parts[0], "KH");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn long_merchant_fields_truncated_to_emv_limits() {
        let mut config = test_config();
        config.merchant_name = "A VERY LONG MERCHANT NAME THAT EXCEEDS THE LIMIT".to_string();
        config.merchant_city = "A CITY NAME LONGER THAN FIFTEEN".to_string();
        let payload = build_payload(&config, Decimal::ONE, "KH-1-00000000").unwrap();
        assert!(payload.contains(&format!("5925{}", &config.merchant_name[..25])));
        assert!(payload.contains(&format!("6015{}", &config.merchant_city[..15])));
    }
}
