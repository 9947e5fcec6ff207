// core/src/membership.rs
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
  pub id: &'static str,
  pub name: &'static str,
  pub price: f64,
  pub badge_icon: &'static str,
}

/// Store catalogue, priced in INR.
pub const MEMBERSHIPS: [Membership; 7] = [
  tier("bronze", "Bronze Membership", 1.00),
  tier("silver", "Silver Membership", 723.89),
  tier("gold", "Gold Membership", 1033.87),
  tier("platinum", "Platinum Membership", 1551.70),
  tier("diamond", "Diamond Membership", 2069.53),
  tier("ultimate", "Ultimate Membership", 5178.30),
  tier("supreme", "Supreme Membership", 10348.42),
];

const fn tier(id: &'static str, name: &'static str, price: f64) -> Membership {
  Membership {
    id,
    name,
    price,
    badge_icon: id,
  }
}

pub fn find_by_id(id: &str) -> Option<&'static Membership> {
  MEMBERSHIPS.iter().find(|m| m.id == id)
}

/// Basket items carry the display name, so that is what checkout looks up.
pub fn find_by_name(name: &str) -> Option<&'static Membership> {
  MEMBERSHIPS.iter().find(|m| m.name.eq_ignore_ascii_case(name.trim()))
}
