// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{collections::HashMap, sync::Arc};

use chrono::NaiveDateTime;
use futures_util::future;
use serde::{Deserialize, Serialize};

use crate::{Result, RockApi, endpoint::parse_endpoint, transport::Transport};

/// Accounts that have children, and top level accounts.
const ACCOUNTS_ENDPOINT: &str = "
    FinancialAccounts?
      $expand=
        ChildAccounts
      &$filter=
        ChildAccounts/any(ca: Id ne null) or
        (Id ne null and ParentAccountId eq null)
";

/// An account (fund) a gift can be given to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FinancialAccount {
    /// Rock's numeric id.
    pub id: i64,
    /// Internal name.
    pub name: Option<String>,
    /// Name shown to givers.
    pub public_name: Option<String>,
    /// Whether gifts can currently go to this account.
    pub is_active: Option<bool>,
    /// Sub-accounts, present when requested with `$expand=ChildAccounts`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub child_accounts: Vec<FinancialAccount>,
    /// Id of the account this one was listed under, filled in by [`attach_accounts`].
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none", rename = "parent")]
    pub parent: Option<i64>,
}

/// The part of a transaction that went to one account.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TransactionDetail {
    /// The account given to.
    pub account_id: i64,
    /// The amount given.
    pub amount: f64,
    /// When the detail was recorded.
    pub created_date_time: Option<NaiveDateTime>,
    /// The account the gift is reported under, filled in by [`attach_accounts`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<FinancialAccount>,
}

/// A gift, split into details per account.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FinancialTransaction {
    /// Rock's numeric id.
    pub id: i64,
    /// Free-text summary, e.g. the gateway reference number.
    pub summary: Option<String>,
    /// When the transaction was recorded.
    pub created_date_time: Option<NaiveDateTime>,
    /// Per account amounts.
    pub transaction_details: Vec<TransactionDetail>,
}

/// Sets the account of every transaction detail.
///
/// `accounts` is a list of top level accounts with their children expanded. A detail
/// whose account is a child account is reported under its parent; a detail for an
/// unknown account is left alone.
///
/// # Examples
///
/// ```
/// use heighliner_rock::models::{attach_accounts, FinancialAccount, FinancialTransaction, TransactionDetail};
///
/// let general = FinancialAccount {
///     id: 1,
///     child_accounts: vec![FinancialAccount { id: 2, ..Default::default() }],
///     ..Default::default()
/// };
/// let mut gifts = vec![FinancialTransaction {
///     transaction_details: vec![TransactionDetail { account_id: 2, amount: 10.0, ..Default::default() }],
///     ..Default::default()
/// }];
///
/// attach_accounts(&mut gifts, vec![general]);
/// assert_eq!(gifts[0].transaction_details[0].account.as_ref().map(|a| a.id), Some(1));
/// ```
pub fn attach_accounts(transactions: &mut [FinancialTransaction], accounts: Vec<FinancialAccount>) {
    let mut by_id = HashMap::new();
    for mut account in accounts {
        for mut child in std::mem::take(&mut account.child_accounts) {
            child.parent = Some(account.id);
            by_id.insert(child.id, child);
        }
        by_id.insert(account.id, account);
    }

    for detail in transactions.iter_mut().flat_map(|t| t.transaction_details.iter_mut()) {
        let Some(account) = by_id.get(&detail.account_id) else {
            continue;
        };
        detail.account = match account.parent {
            Some(parent) => by_id.get(&parent).cloned(),
            None => Some(account.clone()),
        };
    }
}

/// Lookups of financial transactions and giving history.
#[derive(Debug)]
pub struct Transactions<T> {
    api: Arc<RockApi<T>>,
}

impl<T> Transactions<T>
where
    T: Transport,
{
    /// The page size used when the caller does not ask for one.
    pub const DEFAULT_LIMIT: u32 = 20;

    /// Creates the model on top of `api`.
    #[must_use]
    pub fn new(api: Arc<RockApi<T>>) -> Self {
        Self { api }
    }

    /// Loads one page of the transactions authorized by `person_alias_id`, newest first,
    /// with the account of every detail attached.
    ///
    /// # Errors
    ///
    /// Returns an error if Rock cannot be reached or answers with an error.
    pub async fn get_transactions(&self, person_alias_id: i64, limit: u32, skip: u32) -> Result<Vec<FinancialTransaction>> {
        let endpoint = parse_endpoint(&format!(
            "
            FinancialTransactions?
              $filter=
                AuthorizedPersonAliasId eq {person_alias_id}
              &$expand=
                TransactionDetails
              &$orderby=
                CreatedDateTime desc
              &$top={limit}
              &$skip={skip}
            "
        ));
        let accounts_endpoint = parse_endpoint(ACCOUNTS_ENDPOINT);

        let (transactions, accounts) = future::join(
            self.api.get_json::<Vec<FinancialTransaction>>(&endpoint),
            self.api.get_json::<Vec<FinancialAccount>>(&accounts_endpoint),
        )
        .await;

        let mut transactions = transactions?;
        attach_accounts(&mut transactions, accounts?);
        Ok(transactions)
    }

    /// Loads a single transaction by id, with the account of every detail attached.
    ///
    /// # Errors
    ///
    /// Returns an error if Rock cannot be reached or answers with an error.
    pub async fn get_one(&self, id: i64) -> Result<Option<FinancialTransaction>> {
        let endpoint = format!("FinancialTransactions?$filter=Id eq {id}&$expand=TransactionDetails");
        let accounts_endpoint = parse_endpoint(ACCOUNTS_ENDPOINT);

        let (transactions, accounts) = future::join(
            self.api.get_json::<Vec<FinancialTransaction>>(&endpoint),
            self.api.get_json::<Vec<FinancialAccount>>(&accounts_endpoint),
        )
        .await;

        let mut transactions = transactions?;
        transactions.truncate(1);
        attach_accounts(&mut transactions, accounts?);
        Ok(transactions.pop())
    }

    /// Loads the first page with the default size.
    ///
    /// # Errors
    ///
    /// Returns an error if Rock cannot be reached or answers with an error.
    pub async fn get_recent(&self, person_alias_id: i64) -> Result<Vec<FinancialTransaction>> {
        self.get_transactions(person_alias_id, Self::DEFAULT_LIMIT, 0).await
    }
}
