// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use heighliner_cache::{CacheKey, RequestCache};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BinaryFiles, global_id, model_cache};
use crate::{Result, RockApi, endpoint::odata_string, transport::Transport};

const TYPE_NAME: &str = "Person";

/// Shown for people who have not uploaded a photo.
pub const NO_PHOTO_URL: &str = "//dg0ddngxdz549.cloudfront.net/images/cached/images/remote/http_s3.amazonaws.com/ns.images/all/member_images/members.nophoto_1000_1000_90_c1.jpg";

/// A person record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
#[expect(missing_docs, reason = "fields mirror the Rock record of the same name")]
pub struct Person {
    pub id: i64,
    pub guid: Option<Uuid>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nick_name: Option<String>,
    pub email: Option<String>,
    pub photo_id: Option<i64>,
    pub birth_date: Option<NaiveDateTime>,
    pub birth_day: Option<u32>,
    pub birth_month: Option<u32>,
    pub birth_year: Option<i32>,
}

impl Person {
    /// Identifier unique across record types, `Person:<id>`.
    #[must_use]
    pub fn global_id(&self) -> String {
        global_id(TYPE_NAME, self.id)
    }

    /// Age in whole years on `today`, as the gateway reports it. `None` without a birth date.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use heighliner_rock::models::Person;
    ///
    /// let person = Person {
    ///     birth_date: NaiveDate::from_ymd_opt(1990, 6, 15).and_then(|d| d.and_hms_opt(0, 0, 0)),
    ///     ..Person::default()
    /// };
    /// let day_before_birthday = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
    /// assert_eq!(person.age(day_before_birthday).as_deref(), Some("33"));
    /// ```
    #[must_use]
    pub fn age(&self, today: NaiveDate) -> Option<String> {
        let birth_date = self.birth_date?.date();
        Some(today.years_since(birth_date).unwrap_or_default().to_string())
    }
}

/// Lookups of [`Person`] records.
#[derive(Debug)]
pub struct People<T> {
    api: Arc<RockApi<T>>,
    files: Arc<BinaryFiles<T>>,
    people: RequestCache<Option<Person>>,
    searches: RequestCache<Arc<[Person]>>,
}

impl<T> People<T>
where
    T: Transport,
{
    /// Creates the model on top of `api`; photos are resolved through `files`.
    #[must_use]
    pub fn new(api: Arc<RockApi<T>>, files: Arc<BinaryFiles<T>>) -> Self {
        Self {
            people: model_cache(&api, "rock.people"),
            searches: model_cache(&api, "rock.people.search"),
            api,
            files,
        }
    }

    /// Finds the people with the given email address.
    ///
    /// # Errors
    ///
    /// Returns an error if Rock cannot be reached or answers with an error.
    pub async fn find_by_email(&self, email: &str) -> Result<Arc<[Person]>> {
        let key = CacheKey::new(TYPE_NAME).param(&serde_json::json!({ "Email": email }))?;
        let people = self
            .searches
            .get(&key, || async {
                let endpoint = format!("People?$filter=Email eq {}", odata_string(email));
                let people: Vec<Person> = self.api.get_json(&endpoint).await?;
                Ok::<_, crate::Error>(Arc::from(people))
            })
            .await?;
        Ok(people)
    }

    /// Looks a person up by id. Memoized as `Person:<id>`.
    ///
    /// # Errors
    ///
    /// Returns an error if Rock cannot be reached or answers with an error.
    pub async fn get_from_id(&self, id: i64) -> Result<Option<Person>> {
        let key = global_id(TYPE_NAME, id);
        let person = self
            .people
            .get(&key, || self.find_one(format!("People?$filter=Id eq {id}")))
            .await?;
        Ok(person)
    }

    /// Looks a person up by guid. Memoized as `<guid>:PersonGuid`.
    ///
    /// # Errors
    ///
    /// Returns an error if Rock cannot be reached or answers with an error.
    pub async fn get_from_guid(&self, guid: Uuid) -> Result<Option<Person>> {
        let key = format!("{guid}:PersonGuid");
        let person = self
            .people
            .get(&key, || self.find_one(format!("People?$filter=Guid eq guid'{guid}'")))
            .await?;
        Ok(person)
    }

    /// Looks up the person behind a person alias, e.g. a login's `PrimaryAliasId`.
    /// Memoized as `<id>:PersonAliasId`; an alias Rock does not know is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if Rock cannot be reached or answers with an error other than
    /// `404 Not Found`.
    pub async fn get_from_alias_id(&self, alias_id: i64) -> Result<Option<Person>> {
        let key = format!("{alias_id}:PersonAliasId");
        let person = self
            .people
            .get(&key, || async {
                match self.api.get_json::<Person>(&format!("People/GetByPersonAliasId/{alias_id}")).await {
                    Ok(person) => Ok(Some(person)),
                    Err(error) if error.status() == Some(StatusCode::NOT_FOUND) => Ok(None),
                    Err(error) => Err(error),
                }
            })
            .await?;
        Ok(person)
    }

    /// URL of the person's photo: [`NO_PHOTO_URL`] without a photo, `None` if the photo
    /// record is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the photo record cannot be read.
    pub async fn photo_url(&self, person: &Person) -> Result<Option<String>> {
        let Some(photo_id) = person.photo_id else {
            return Ok(Some(NO_PHOTO_URL.to_owned()));
        };
        let file = self.files.get_from_id(photo_id).await?;
        Ok(file.and_then(|file| file.path))
    }

    async fn find_one(&self, endpoint: String) -> Result<Option<Person>> {
        let people: Vec<Person> = self.api.get_json(&endpoint).await?;
        Ok(people.into_iter().next())
    }
}
