// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Translation of NMI payment gateway records into Rock financial records.
//!
//! NMI reports a transaction as a loosely typed document in which repeated elements
//! appear as a single object when there is only one of them. [`NmiTransaction`] accepts
//! both shapes; [`translate_nmi`] turns a completed sale into the records Rock needs to
//! book the gift.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

const TRANSACTION_TYPE_CONTRIBUTION: i64 = 53;
const SOURCE_TYPE_WEBSITE: i64 = 798;
const CURRENCY_TYPE_CARD: i64 = 156;
const CURRENCY_TYPE_ACH: i64 = 157;

const ACCOUNT_FIELD: &str = "1";
const CAMPUS_FIELD: &str = "2";

/// An element NMI sends either once or as a list.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// Several elements.
    Many(Vec<T>),
    /// A single element.
    One(T),
}

impl<T> OneOrMany<T> {
    /// The elements as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::One(one) => std::slice::from_ref(one),
            Self::Many(many) => many,
        }
    }
}

/// A transaction as reported by the NMI query API.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
#[expect(missing_docs, reason = "fields mirror the NMI query response")]
pub struct NmiTransaction {
    pub transaction_id: String,
    pub order_id: Option<String>,
    pub original_transaction_id: Option<String>,
    pub condition: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub address_1: Option<String>,
    pub address_2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub cc_number: Option<String>,
    pub check_account: Option<String>,
    pub action: Option<OneOrMany<NmiAction>>,
    pub product: Option<OneOrMany<NmiProduct>>,
    pub merchant_defined_field: Option<OneOrMany<MerchantDefinedField>>,
}

/// One step in the life of an NMI transaction, e.g. the sale and its settlement.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NmiAction {
    /// `sale`, `settle`, `refund`, ...
    pub action_type: String,
    /// Decimal amount, e.g. `"25.00"`.
    pub amount: String,
    /// When the action happened, as `YYYYMMDDHHmmss`.
    pub date: String,
    /// What started the action; `recurring` for scheduled gifts.
    pub source: String,
}

/// A line item of an NMI transaction. The sku holds the Rock account id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NmiProduct {
    /// Rock account id.
    pub sku: String,
}

/// A numbered custom field set by the merchant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MerchantDefinedField {
    /// Field number.
    pub id: String,
    /// Field value.
    #[serde(rename = "_")]
    pub value: String,
}

/// The Rock gateway record the transaction came through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FinancialGateway {
    /// Rock's numeric id.
    pub id: i64,
}

/// The Rock records for one completed NMI transaction.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NmiTranslation {
    /// The financial transaction.
    pub transaction: Transaction,
    /// Who gave.
    pub person: Giver,
    /// The billing address.
    pub location: Location,
    /// Amount per account.
    pub transaction_details: Vec<Detail>,
    /// How the gift was paid.
    pub payment_detail: PaymentDetail,
    /// The campus the gift was given at, if NMI knows it.
    pub campus_id: Option<i64>,
    /// The schedule a recurring gift belongs to.
    pub scheduled_transaction: ScheduledTransaction,
}

/// The `FinancialTransaction` to create.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
#[expect(missing_docs, reason = "fields mirror the Rock record of the same name")]
pub struct Transaction {
    pub transaction_code: String,
    pub foreign_key: Option<String>,
    pub transaction_type_value_id: i64,
    pub guid: Uuid,
    pub financial_gateway_id: i64,
    pub summary: String,
    pub source_type_value_id: i64,
    /// ISO 8601 in UTC, e.g. `2016-06-14T12:34:56.000Z`.
    pub transaction_date_time: String,
}

/// One `FinancialTransactionDetail`: the amount given to an account.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
#[expect(missing_docs, reason = "fields mirror the Rock record of the same name")]
pub struct Detail {
    pub amount: f64,
    pub account_id: i64,
    pub guid: Uuid,
}

/// The `FinancialPaymentDetail` to create.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
#[expect(missing_docs, reason = "fields mirror the Rock record of the same name")]
pub struct PaymentDetail {
    /// Card or account number with the hidden digits as `*`.
    pub account_number_masked: Option<String>,
    pub currency_type_value_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_card_type_value_id: Option<i64>,
    pub guid: Uuid,
}

/// The giver: a known person, or the contact details NMI collected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Giver {
    /// An existing Rock person.
    #[serde(rename_all = "PascalCase")]
    Known {
        /// The person's id.
        id: i64,
    },
    /// Someone to match or create from the billing details.
    #[serde(rename_all = "PascalCase")]
    Contact {
        /// Billing last name.
        last_name: Option<String>,
        /// Billing email.
        email: Option<String>,
    },
}

/// Billing address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
#[expect(missing_docs, reason = "fields mirror the Rock record of the same name")]
pub struct Location {
    pub street1: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Link to the schedule of a recurring gift; empty for one-time gifts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScheduledTransaction {
    /// NMI id of the transaction that set up the schedule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_schedule_id: Option<String>,
}

/// Translates an NMI transaction into Rock records.
///
/// Returns `None` for transactions that did not complete and for actions other than
/// sales and settlements. When the response lists several actions the first sale wins,
/// then the first settlement, then the first action.
///
/// With a `person` id the gift is booked to that person; otherwise the billing last name
/// and email are passed along for matching.
///
/// # Errors
///
/// Returns [`Error::Translate`] if a completed transaction has no action, if an amount,
/// account or campus is not a number, if the action date is malformed, or if a recurring
/// gift without products does not name its account.
///
/// # Examples
///
/// ```
/// use heighliner_rock::nmi::{FinancialGateway, Giver, NmiTransaction, translate_nmi};
///
/// let response: NmiTransaction = serde_json::from_value(serde_json::json!({
///     "transaction_id": "3150541012",
///     "condition": "complete",
///     "cc_number": "4xxxxxxxxxxx1111",
///     "action": { "action_type": "sale", "amount": "25.00", "date": "20160614123456" },
///     "product": { "sku": "125" },
///     "merchant_defined_field": [{ "id": "2", "_": "3" }]
/// }))?;
///
/// let translation = translate_nmi(&response, FinancialGateway { id: 2 }, Some(42))?
///     .expect("a completed sale");
///
/// assert_eq!(translation.transaction.summary, "Reference Number: 3150541012");
/// assert_eq!(translation.transaction_details[0].account_id, 125);
/// assert_eq!(translation.payment_detail.credit_card_type_value_id, Some(7));
/// assert_eq!(translation.campus_id, Some(3));
/// assert_eq!(translation.person, Giver::Known { id: 42 });
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn translate_nmi(response: &NmiTransaction, gateway: FinancialGateway, person: Option<i64>) -> Result<Option<NmiTranslation>> {
    if response.condition != "complete" {
        return Ok(None);
    }
    let action = pick_action(response)
        .ok_or_else(|| Error::Translate(format!("transaction {} has no action", response.transaction_id)))?;
    if action.action_type != "sale" && action.action_type != "settle" {
        return Ok(None);
    }

    let transaction = Transaction {
        transaction_code: response.transaction_id.clone(),
        foreign_key: response.order_id.clone(),
        transaction_type_value_id: TRANSACTION_TYPE_CONTRIBUTION,
        guid: Uuid::new_v4(),
        financial_gateway_id: gateway.id,
        summary: format!("Reference Number: {}", response.transaction_id),
        source_type_value_id: SOURCE_TYPE_WEBSITE,
        transaction_date_time: iso_date(&action.date)?,
    };

    let card = non_empty(response.cc_number.as_deref());
    let account_number_masked = card
        .or_else(|| non_empty(response.check_account.as_deref()))
        .map(|number| number.replace(['x', 'X'], "*"));
    let payment_detail = PaymentDetail {
        credit_card_type_value_id: card.and(account_number_masked.as_deref()).and_then(card_type),
        account_number_masked,
        currency_type_value_id: if card.is_some() { CURRENCY_TYPE_CARD } else { CURRENCY_TYPE_ACH },
        guid: Uuid::new_v4(),
    };

    // Only a field list without a campus entry is worth a warning.
    let campus_id = match field(response, CAMPUS_FIELD) {
        Some(campus) => Some(number("campus", campus)?),
        None if response.merchant_defined_field.is_some() => {
            tracing::warn!(nmi.transaction_id = %response.transaction_id, "nmi.missing_campus");
            None
        }
        None => None,
    };

    let person = match person {
        Some(id) => Giver::Known { id },
        None => Giver::Contact {
            last_name: response.last_name.clone(),
            email: response.email.clone(),
        },
    };

    Ok(Some(NmiTranslation {
        transaction,
        person,
        location: Location {
            street1: response.address_1.clone(),
            street2: response.address_2.clone(),
            city: response.city.clone(),
            state: response.state.clone(),
            postal_code: response.postal_code.clone(),
            country: response.country.clone(),
        },
        transaction_details: details(response, action)?,
        payment_detail,
        campus_id,
        scheduled_transaction: ScheduledTransaction {
            gateway_schedule_id: response.original_transaction_id.clone(),
        },
    }))
}

fn pick_action(response: &NmiTransaction) -> Option<&NmiAction> {
    let actions = response.action.as_ref()?.as_slice();
    actions
        .iter()
        .find(|a| a.action_type == "sale")
        .or_else(|| actions.iter().find(|a| a.action_type == "settle"))
        .or_else(|| actions.first())
}

fn details(response: &NmiTransaction, action: &NmiAction) -> Result<Vec<Detail>> {
    let amount: f64 = number("amount", &action.amount)?;

    if let Some(products) = &response.product {
        return products
            .as_slice()
            .iter()
            .map(|product| {
                Ok(Detail {
                    amount,
                    account_id: number("account", &product.sku)?,
                    guid: Uuid::new_v4(),
                })
            })
            .collect();
    }

    if action.source != "recurring" {
        return Ok(Vec::new());
    }

    let account = field(response, ACCOUNT_FIELD).ok_or_else(|| {
        Error::Translate(format!(
            "recurring transaction {} does not name its account",
            response.transaction_id
        ))
    })?;
    Ok(vec![Detail {
        amount,
        account_id: number("account", account)?,
        guid: Uuid::new_v4(),
    }])
}

fn field<'a>(response: &'a NmiTransaction, id: &str) -> Option<&'a str> {
    response
        .merchant_defined_field
        .as_ref()?
        .as_slice()
        .iter()
        .find(|f| f.id == id)
        .map(|f| f.value.as_str())
}

fn number<N>(what: &str, value: &str) -> Result<N>
where
    N: std::str::FromStr,
{
    value
        .trim()
        .parse()
        .map_err(|_parse_error| Error::Translate(format!("{what} {value:?} is not a number")))
}

fn iso_date(date: &str) -> Result<String> {
    let parsed = NaiveDateTime::parse_from_str(date, "%Y%m%d%H%M%S")
        .map_err(|e| Error::Translate(format!("action date {date:?} is malformed: {e}")))?;
    Ok(parsed.and_utc().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Card brands recognized from the leading digits of a card number, in priority order.
const CARD_BRANDS: &[(&str, &[(u32, u32)])] = &[
    ("Visa", &[(4, 4)]),
    ("MasterCard", &[(51, 55), (2221, 2720)]),
    ("American Express", &[(34, 34), (37, 37)]),
    ("Discover", &[(6011, 6011), (644, 649), (65, 65)]),
];

/// The brand of a card, judged from its first four characters.
///
/// Masked numbers work as long as the leading digits are visible; anything without a
/// recognizable prefix is a generic `"Credit Card"`.
///
/// ```
/// use heighliner_rock::nmi::card_name;
///
/// assert_eq!(card_name("4***********1111"), "Visa");
/// assert_eq!(card_name("3782***********"), "American Express");
/// assert_eq!(card_name("************1111"), "Credit Card");
/// ```
#[must_use]
pub fn card_name(number: &str) -> &'static str {
    let prefix: String = number.chars().take(4).take_while(char::is_ascii_digit).collect();
    if prefix.is_empty() {
        return "Credit Card";
    }
    CARD_BRANDS
        .iter()
        .find(|(_, ranges)| ranges.iter().any(|&(min, max)| prefix_matches(&prefix, min, max)))
        .map_or("Credit Card", |&(name, _)| name)
}

/// Rock's defined value for the brand of a card, `None` for unrecognized cards.
#[must_use]
pub fn card_type(number: &str) -> Option<i64> {
    match card_name(number) {
        "Visa" => Some(7),
        "MasterCard" => Some(8),
        "Discover" => Some(160),
        "American Express" => Some(159),
        _ => None,
    }
}

/// Whether a card starting with the digits `prefix` can fall in `min..=max`, where both
/// bounds have the same number of digits.
fn prefix_matches(prefix: &str, min: u32, max: u32) -> bool {
    let width = digits(min);
    let Ok(value) = prefix.get(..prefix.len().min(width)).unwrap_or(prefix).parse::<u32>() else {
        return false;
    };
    if prefix.len() >= width {
        return (min..=max).contains(&value);
    }
    let scale = 10_u32.pow(u32::try_from(width - prefix.len()).unwrap_or(0));
    let low = value * scale;
    let high = low + scale - 1;
    low <= max && high >= min
}

fn digits(mut n: u32) -> usize {
    let mut count = 1;
    while n >= 10 {
        n /= 10;
        count += 1;
    }
    count
}
