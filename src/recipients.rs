//! Recipient normalization and address validation
//!
//! Front ends accept recipients either as a single delimited string
//! (`"a@x.com; b@x.com, c@x.com"`) or as a list. Both shapes are collapsed
//! into a plain ordered `Vec<String>` here so nothing downstream branches on
//! input shape again.

use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Ordered address list; duplicates are preserved
pub type RecipientList = Vec<String>;

static ADDRESS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w.-]+@[\w.-]+\.\w{2,}$").expect("invalid address regex")
});

/// Recipient field as supplied by a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RecipientInput {
    /// Comma and/or semicolon separated addresses
    Delimited(String),
    /// Already split addresses, taken verbatim
    List(Vec<String>),
}

impl From<&str> for RecipientInput {
    fn from(value: &str) -> Self {
        Self::Delimited(value.to_owned())
    }
}

impl From<Vec<String>> for RecipientInput {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Collapse a recipient field into a canonical list
///
/// Lists pass through untouched. Strings are split on `,` and `;`, each piece
/// trimmed, and empty pieces dropped. An absent field yields an empty list.
pub fn normalize(input: Option<&RecipientInput>) -> RecipientList {
    match input {
        Some(RecipientInput::List(list)) => list.clone(),
        Some(RecipientInput::Delimited(raw)) => raw
            .split([',', ';'])
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .map(str::to_owned)
            .collect(),
        None => Vec::new(),
    }
}

/// Whether a single address satisfies the accepted `local@domain.tld` shape
pub fn is_valid_address(address: &str) -> bool {
    ADDRESS_REGEX.is_match(address)
}

/// Return the addresses that fail the format rule, in input order
pub fn validate<'a, I>(addresses: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    addresses
        .into_iter()
        .filter(|address| !is_valid_address(address))
        .cloned()
        .collect()
}

/// Normalized TO/CC/BCC lists for one operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    pub to: RecipientList,
    pub cc: RecipientList,
    pub bcc: RecipientList,
}

impl Recipients {
    /// Normalize the three raw recipient fields of a request
    pub fn from_inputs(
        to: Option<&RecipientInput>,
        cc: Option<&RecipientInput>,
        bcc: Option<&RecipientInput>,
    ) -> Self {
        Self {
            to: normalize(to),
            cc: normalize(cc),
            bcc: normalize(bcc),
        }
    }

    /// Invalid addresses across TO, CC and BCC, checked in one pass
    pub fn invalid_addresses(&self) -> Vec<String> {
        validate(self.to.iter().chain(&self.cc).chain(&self.bcc))
    }
}
