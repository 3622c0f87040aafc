// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end tests of the Rock client and models against an in-memory transport.

use std::{sync::Arc, time::Duration};

use heighliner_cache::RequestCache;
use heighliner_rock::{
    Error, RockApi, RockSettings,
    models::{BinaryFiles, NO_PHOTO_URL, People, Transactions},
    testing::MockTransport,
};
use heighliner_testing::LogCapture;
use http::StatusCode;
use serde_json::{Value, json};
use tick::ClockControl;

fn settings() -> RockSettings {
    RockSettings {
        base_url: "https://rock.example.com/".to_string(),
        token_name: "Authorization-Token".to_string(),
        token: "s3cr3t".to_string(),
        cache_ttl_secs: Some(60),
    }
}

fn rock(transport: &MockTransport, clock: &ClockControl) -> Arc<RockApi<MockTransport>> {
    let settings = settings();
    let cache = RequestCache::builder(clock.to_clock())
        .namespace("rock")
        .maybe_ttl(settings.cache_ttl())
        .build();
    Arc::new(RockApi::new(settings, transport.clone(), Arc::new(cache)).unwrap())
}

fn people(rock: &Arc<RockApi<MockTransport>>) -> People<MockTransport> {
    People::new(Arc::clone(rock), Arc::new(BinaryFiles::new(Arc::clone(rock))))
}

fn ada() -> Value {
    json!({ "Id": 42, "FirstName": "Augusta", "NickName": "Ada", "LastName": "Lovelace", "PhotoId": 7 })
}

#[tokio::test]
async fn concurrent_reads_share_one_request() {
    let transport = MockTransport::new();
    transport.respond_json("People/42", ada());
    let rock = rock(&transport, &ClockControl::new());

    let (first, second) = futures::join!(rock.get("People/42"), rock.get("People/42"));

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn reads_expire_after_the_configured_ttl() {
    let transport = MockTransport::new();
    transport.respond_json("Campuses", json!([{ "Id": 1 }]));
    let clock = ClockControl::new();
    let rock = rock(&transport, &clock);

    rock.get("Campuses").await.unwrap();
    clock.advance(Duration::from_secs(59));
    rock.get("Campuses").await.unwrap();
    assert_eq!(transport.requests().len(), 1);

    clock.advance(Duration::from_secs(1));
    rock.get("Campuses").await.unwrap();
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn clearing_the_cache_refetches() {
    let transport = MockTransport::new();
    transport.respond_json("Campuses", json!([]));
    let rock = rock(&transport, &ClockControl::new());

    rock.get("Campuses").await.unwrap();
    rock.cache().clear();
    rock.get("Campuses").await.unwrap();

    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn shared_failure_reaches_every_caller_and_is_logged() {
    let capture = LogCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let transport = MockTransport::new();
    transport.respond("People/42", StatusCode::INTERNAL_SERVER_ERROR, "");
    let rock = rock(&transport, &ClockControl::new());

    let (first, second) = futures::join!(rock.get("People/42"), rock.get("People/42"));
    let (first, second) = (first.unwrap_err(), second.unwrap_err());

    assert_eq!(first.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(second.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert!(matches!((&first, &second), (Error::Shared(a), Error::Shared(b)) if a.ptr_eq(b)));
    assert_eq!(transport.requests().len(), 1);
    capture.assert_contains("rock.status");
    capture.assert_contains("rock.status=500");

    transport.respond_json("People/42", ada());
    let person: Value = rock.get_json("People/42").await.unwrap();
    assert_eq!(person["NickName"], "Ada");
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn transport_failures_are_reported() {
    let transport = MockTransport::new();
    transport.fail("People", "connection reset");
    let rock = rock(&transport, &ClockControl::new());

    let error = rock.get("People").await.unwrap_err();

    let Error::Shared(shared) = &error else {
        panic!("expected a shared error, got {error:?}");
    };
    assert!(matches!(shared.downcast_ref::<Error>(), Some(Error::Transport(_))));
    assert!(rock.cache().is_empty());
}

#[tokio::test]
async fn person_with_photo() {
    let transport = MockTransport::new();
    transport.respond_json("People?$filter=Id eq 42", json!([ada()]));
    transport.respond_json(
        "BinaryFiles?$filter=Id eq 7",
        json!([{ "Id": 7, "FileName": "ada.jpg", "Path": "~/GetImage.ashx?id=7" }]),
    );
    let rock = rock(&transport, &ClockControl::new());
    let people = people(&rock);

    let person = people.get_from_id(42).await.unwrap().unwrap();
    assert_eq!(person.global_id(), "Person:42");
    assert_eq!(person.nick_name.as_deref(), Some("Ada"));

    let photo = people.photo_url(&person).await.unwrap();
    assert_eq!(photo.as_deref(), Some("https://rock.example.com/GetImage.ashx"));
}

#[tokio::test]
async fn person_without_photo_gets_the_placeholder() {
    let transport = MockTransport::new();
    let rock = rock(&transport, &ClockControl::new());
    let people = people(&rock);

    let person = heighliner_rock::models::Person::default();
    assert_eq!(people.photo_url(&person).await.unwrap().as_deref(), Some(NO_PHOTO_URL));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn concurrent_model_lookups_share_one_request() {
    let transport = MockTransport::new();
    transport.respond_json("People?$filter=Id eq 42", json!([ada()]));
    let rock = rock(&transport, &ClockControl::new());
    let people = people(&rock);

    let (first, second, third) = futures::join!(people.get_from_id(42), people.get_from_id(42), people.get_from_id(42));

    assert_eq!(first.unwrap(), second.unwrap());
    assert!(third.unwrap().is_some());
    assert_eq!(transport.count("People?$filter=Id eq 42"), 1);
}

#[tokio::test]
async fn unknown_person_is_none() {
    let transport = MockTransport::new();
    transport.respond_json("People?$filter=Guid eq", json!([]));
    let rock = rock(&transport, &ClockControl::new());

    let guid = uuid::Uuid::nil();
    assert_eq!(people(&rock).get_from_guid(guid).await.unwrap(), None);
    assert_eq!(transport.count(&format!("guid'{guid}'")), 1);
}

#[tokio::test]
async fn email_search_is_memoized() {
    let transport = MockTransport::new();
    transport.respond_json("People?$filter=Email eq", json!([ada()]));
    let rock = rock(&transport, &ClockControl::new());
    let people = people(&rock);

    let found = people.find_by_email("ada@example.com").await.unwrap();
    let again = people.find_by_email("ada@example.com").await.unwrap();

    assert_eq!(found.len(), 1);
    assert!(Arc::ptr_eq(&found, &again));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn file_search_ignores_field_order() {
    let transport = MockTransport::new();
    transport.respond_json("BinaryFiles?$filter=", json!([{ "Id": 7, "Path": "~/GetImage.ashx?id=7" }]));
    let rock = rock(&transport, &ClockControl::new());
    let files = BinaryFiles::new(Arc::clone(&rock));

    let Value::Object(query) = json!({ "MimeType": "image/jpeg", "IsTemporary": false }) else {
        unreachable!()
    };
    let mut reordered = serde_json::Map::new();
    reordered.insert("IsTemporary".into(), json!(false));
    reordered.insert("MimeType".into(), json!("image/jpeg"));

    let found = files.find(&query).await.unwrap();
    files.find(&reordered).await.unwrap();

    assert_eq!(found[0].path.as_deref(), Some("https://rock.example.com/GetImage.ashx"));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn giving_history_with_accounts() {
    let transport = MockTransport::new();
    transport.respond_json(
        "FinancialTransactions",
        json!([{
            "Id": 900,
            "Summary": "Reference Number: 3150541012",
            "CreatedDateTime": "2016-06-14T12:34:56",
            "TransactionDetails": [{ "AccountId": 11, "Amount": 25.0 }]
        }]),
    );
    transport.respond_json(
        "FinancialAccounts",
        json!([{ "Id": 1, "PublicName": "General Fund", "ChildAccounts": [{ "Id": 11, "PublicName": "Missions" }] }]),
    );
    let rock = rock(&transport, &ClockControl::new());

    let gifts = Transactions::new(Arc::clone(&rock)).get_recent(5).await.unwrap();

    assert_eq!(gifts.len(), 1);
    let account = gifts[0].transaction_details[0].account.as_ref().unwrap();
    assert_eq!(account.public_name.as_deref(), Some("General Fund"));
    assert_eq!(
        transport.count("FinancialTransactions?$filter=AuthorizedPersonAliasId eq 5&$expand=TransactionDetails"),
        1
    );
    assert_eq!(transport.count("$top=20&$skip=0"), 1);
}

#[tokio::test]
async fn person_from_alias_id() {
    let transport = MockTransport::new();
    transport.respond_json("People/GetByPersonAliasId/90", ada());
    let rock = rock(&transport, &ClockControl::new());
    let people = people(&rock);

    let (first, second) = futures::join!(people.get_from_alias_id(90), people.get_from_alias_id(90));
    let again = people.get_from_alias_id(90).await.unwrap();

    assert_eq!(first.unwrap().map(|person| person.id), Some(42));
    assert_eq!(second.unwrap(), again);
    assert_eq!(transport.count("People/GetByPersonAliasId/90"), 1);
}

#[tokio::test]
async fn unknown_alias_is_none() {
    let transport = MockTransport::new();
    let rock = rock(&transport, &ClockControl::new());

    assert_eq!(people(&rock).get_from_alias_id(7).await.unwrap(), None);
    assert_eq!(transport.count("People/GetByPersonAliasId/7"), 1);
}

#[tokio::test]
async fn single_transaction_with_accounts() {
    let transport = MockTransport::new();
    transport.respond_json(
        "FinancialTransactions?$filter=Id eq 900",
        json!([{ "Id": 900, "TransactionDetails": [{ "AccountId": 11, "Amount": 25.0 }] }]),
    );
    transport.respond_json(
        "FinancialAccounts",
        json!([{ "Id": 1, "PublicName": "General Fund", "ChildAccounts": [{ "Id": 11, "PublicName": "Missions" }] }]),
    );
    let rock = rock(&transport, &ClockControl::new());
    let transactions = Transactions::new(Arc::clone(&rock));

    let gift = transactions.get_one(900).await.unwrap().unwrap();
    transactions.get_one(900).await.unwrap();

    assert_eq!(gift.id, 900);
    let account = gift.transaction_details[0].account.as_ref().unwrap();
    assert_eq!(account.public_name.as_deref(), Some("General Fund"));
    assert_eq!(transport.count("FinancialTransactions?$filter=Id eq 900&$expand=TransactionDetails"), 1);
    assert_eq!(transport.count("FinancialAccounts"), 1);
}

#[tokio::test]
async fn unknown_transaction_is_none() {
    let transport = MockTransport::new();
    transport.respond_json("FinancialTransactions", json!([]));
    transport.respond_json("FinancialAccounts", json!([]));
    let rock = rock(&transport, &ClockControl::new());

    assert_eq!(Transactions::new(rock).get_one(1).await.unwrap(), None);
}
