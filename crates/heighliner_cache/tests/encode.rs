// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Canonical encoding of the request parameters resolvers turn into keys.

use std::{
    collections::{BTreeMap, HashMap},
    rc::Rc,
};

use heighliner_cache::{CacheKey, EncodingError, MAX_DEPTH, encode};
use serde::Serialize;
use serde_json::json;

#[test]
fn object_key_order_is_irrelevant() {
    assert_eq!(encode(&json!({ "a": 1, "b": 2 })), encode(&json!({ "b": 2, "a": 1 })));
    assert_eq!(encode(&json!({ "a": 1, "b": 2 })).unwrap(), r#"{"a":1,"b":2}"#);
}

#[test]
fn array_order_is_significant() {
    assert_ne!(encode(&[1, 2]).unwrap(), encode(&[2, 1]).unwrap());
}

#[test]
fn hash_map_encodes_like_sorted_map() {
    let hashed: HashMap<&str, u32> = [("zeta", 1), ("alpha", 2), ("mu", 3)].into_iter().collect();
    let sorted: BTreeMap<&str, u32> = hashed.iter().map(|(k, v)| (*k, *v)).collect();

    assert_eq!(encode(&hashed).unwrap(), encode(&sorted).unwrap());
}

#[derive(Serialize)]
struct PersonQuery<'a> {
    email: &'a str,
    take: Option<u32>,
    include_deceased: bool,
}

#[test]
fn struct_and_equivalent_object_share_an_encoding() {
    let query = PersonQuery {
        email: "ada@example.com",
        take: None,
        include_deceased: false,
    };
    let object = json!({ "take": null, "include_deceased": false, "email": "ada@example.com" });

    assert_eq!(encode(&query).unwrap(), encode(&object).unwrap());
}

#[derive(Serialize)]
enum Filter {
    All,
    ById(u32),
    ByName { first: String, last: String },
}

#[test]
fn enums_use_external_tagging() {
    assert_eq!(encode(&Filter::All).unwrap(), r#""All""#);
    assert_eq!(encode(&Filter::ById(7)).unwrap(), r#"{"ById":7}"#);
    assert_eq!(
        encode(&Filter::ByName {
            last: "Lovelace".into(),
            first: "Ada".into(),
        })
        .unwrap(),
        r#"{"ByName":{"first":"Ada","last":"Lovelace"}}"#
    );
}

#[test]
fn scalars_encode_as_json() {
    assert_eq!(encode(&()).unwrap(), "null");
    assert_eq!(encode(&true).unwrap(), "true");
    assert_eq!(encode(&-12_i64).unwrap(), "-12");
    assert_eq!(encode(&u64::MAX).unwrap(), "18446744073709551615");
    assert_eq!(encode(&1.5_f64).unwrap(), "1.5");
    assert_eq!(encode(&'x').unwrap(), r#""x""#);
    assert_eq!(encode("Ada").unwrap(), r#""Ada""#);
    assert_eq!(encode(&Some(3)).unwrap(), "3");
}

#[test]
fn shared_references_are_not_cycles() {
    let shared = Rc::new(json!({ "Id": 1 }));
    let value = vec![Rc::clone(&shared), Rc::clone(&shared)];

    assert_eq!(encode(&value).unwrap(), r#"[{"Id":1},{"Id":1}]"#);
}

#[test]
fn conflicting_keys_are_rejected() {
    let mut keys = BTreeMap::new();
    keys.insert(KeyLike::Int(1), "int");
    keys.insert(KeyLike::Str("1"), "str");

    assert_eq!(encode(&keys), Err(EncodingError::DuplicateKey("1".to_string())));
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum KeyLike {
    Int(u32),
    Str(&'static str),
}

impl Serialize for KeyLike {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Int(i) => serializer.serialize_u32(*i),
            Self::Str(s) => serializer.serialize_str(s),
        }
    }
}

#[test]
fn non_finite_floats_are_rejected() {
    assert_eq!(encode(&f64::NAN), Err(EncodingError::NonFiniteFloat));
    assert_eq!(encode(&[1.0, f64::INFINITY]), Err(EncodingError::NonFiniteFloat));
}

struct Endless;

impl Serialize for Endless {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;

        let mut seq = serializer.serialize_seq(Some(1))?;
        seq.serialize_element(&Endless)?;
        seq.end()
    }
}

#[test]
fn self_referencing_value_is_rejected() {
    assert_eq!(encode(&Endless), Err(EncodingError::DepthExceeded(MAX_DEPTH)));
}

#[test]
fn cache_keys_from_equal_params_are_equal() {
    let a = CacheKey::new("FinancialTransactions")
        .param(&json!({ "$filter": "AuthorizedPersonAliasId eq 9", "$top": 20, "$skip": 0 }))
        .unwrap();
    let b = CacheKey::new("FinancialTransactions")
        .param(&json!({ "$skip": 0, "$top": 20, "$filter": "AuthorizedPersonAliasId eq 9" }))
        .unwrap();

    assert_eq!(a, b);
    assert!(a.as_str().starts_with("FinancialTransactions:{"));
}
