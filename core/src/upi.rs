// core/src/upi.rs

//! UPI deep links and QR image URLs for "scan to pay".

use url::form_urlencoded;

pub const DEFAULT_PAYEE_ADDRESS: &str = "mastermindaggaming@oksbi";
pub const DEFAULT_PAYEE_NAME: &str = "Protocol Zero";
pub const DEFAULT_CURRENCY: &str = "INR";
pub const DEFAULT_QR_SIZE: u32 = 260;

const QR_ENDPOINT: &str = "https://api.qrserver.com/v1/create-qr-code/";

#[derive(Debug, Clone, Default)]
pub struct UpiOptions {
  pub payee_address: Option<String>,
  pub payee_name: Option<String>,
  pub currency: Option<String>,
  /// `tn`, shown to the payer.
  pub transaction_note: Option<String>,
  /// `tr`, the merchant reference (the order id).
  pub transaction_ref: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
  value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// `upi://pay?pa=..&pn=..&am=..&cu=..[&tn=..][&tr=..]` with the amount at two decimals.
pub fn payment_uri(amount: f64, options: &UpiOptions) -> String {
  let mut query = form_urlencoded::Serializer::new(String::new());
  query
    .append_pair("pa", non_empty(&options.payee_address).unwrap_or(DEFAULT_PAYEE_ADDRESS))
    .append_pair("pn", non_empty(&options.payee_name).unwrap_or(DEFAULT_PAYEE_NAME))
    .append_pair("am", &format!("{:.2}", amount))
    .append_pair("cu", non_empty(&options.currency).unwrap_or(DEFAULT_CURRENCY));
  if let Some(note) = non_empty(&options.transaction_note) {
    query.append_pair("tn", note);
  }
  if let Some(reference) = non_empty(&options.transaction_ref) {
    query.append_pair("tr", reference);
  }
  format!("upi://pay?{}", query.finish())
}

pub fn qr_code_url(amount: f64, options: &UpiOptions, size: u32) -> String {
  let uri = payment_uri(amount, options);
  format!(
    "{}?size={}x{}&data={}",
    QR_ENDPOINT,
    size,
    size,
    urlencoding::encode(&uri)
  )
}
