// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use heighliner_cache::{CacheKey, RequestCache};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{global_id, model_cache};
use crate::{Result, RockApi, endpoint::odata_string, transport::Transport};

const TYPE_NAME: &str = "BinaryFile";

/// A file stored in Rock, such as a profile photo.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BinaryFile {
    /// Rock's numeric id.
    pub id: i64,
    /// Rock's unique identifier.
    #[serde(default)]
    pub guid: Option<Uuid>,
    /// Name of the file as uploaded.
    #[serde(default)]
    pub file_name: Option<String>,
    /// Media type, e.g. `image/jpeg`.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Where the file can be downloaded. Rock reports paths relative to the site as `~/...`.
    #[serde(default)]
    pub path: Option<String>,
}

/// Turns the path of `file` into an absolute URL without query string.
///
/// A path starting with `~` is relative to the Rock site: its first two characters are
/// replaced by `base_url`.
///
/// # Examples
///
/// ```
/// use heighliner_rock::models::{BinaryFile, process_file};
///
/// let file = BinaryFile {
///     path: Some("~/GetImage.ashx?id=7&width=200".into()),
///     ..BinaryFile::default()
/// };
/// let file = process_file(file, "https://rock.example.com/");
/// assert_eq!(file.path.as_deref(), Some("https://rock.example.com/GetImage.ashx"));
/// ```
#[must_use]
pub fn process_file(mut file: BinaryFile, base_url: &str) -> BinaryFile {
    if let Some(path) = file.path.as_mut() {
        if path.starts_with('~') {
            let rest = path.char_indices().nth(2).map_or("", |(i, _)| &path[i..]);
            *path = format!("{base_url}{rest}");
        }
        if let Some(query) = path.find('?') {
            path.truncate(query);
        }
    }
    file
}

/// Lookups of [`BinaryFile`] records.
#[derive(Debug)]
pub struct BinaryFiles<T> {
    api: Arc<RockApi<T>>,
    files: RequestCache<Option<BinaryFile>>,
    searches: RequestCache<Arc<[BinaryFile]>>,
}

impl<T> BinaryFiles<T>
where
    T: Transport,
{
    /// Creates the model on top of `api`.
    #[must_use]
    pub fn new(api: Arc<RockApi<T>>) -> Self {
        Self {
            files: model_cache(&api, "rock.binary_files"),
            searches: model_cache(&api, "rock.binary_files.search"),
            api,
        }
    }

    /// Looks a file up by id. Memoized as `BinaryFile:<id>`.
    ///
    /// # Errors
    ///
    /// Returns an error if Rock cannot be reached or answers with an error.
    pub async fn get_from_id(&self, id: i64) -> Result<Option<BinaryFile>> {
        let key = global_id(TYPE_NAME, id);
        let file = self
            .files
            .get(&key, || self.find_one(format!("BinaryFiles?$filter=Id eq {id}")))
            .await?;
        Ok(file)
    }

    /// Looks a file up by guid. Memoized as `<guid>:BinaryFileGuid`.
    ///
    /// # Errors
    ///
    /// Returns an error if Rock cannot be reached or answers with an error.
    pub async fn get_from_guid(&self, guid: Uuid) -> Result<Option<BinaryFile>> {
        let key = format!("{guid}:BinaryFileGuid");
        let file = self
            .files
            .get(&key, || self.find_one(format!("BinaryFiles?$filter=Guid eq guid'{guid}'")))
            .await?;
        Ok(file)
    }

    /// Finds the files whose fields equal the values in `query`, e.g.
    /// `{"MimeType": "image/jpeg"}`. Memoized under the canonical encoding of `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if Rock cannot be reached or answers with an error.
    pub async fn find(&self, query: &Map<String, Value>) -> Result<Arc<[BinaryFile]>> {
        let key = CacheKey::new("BinaryFiles").param(query)?;
        let files = self
            .searches
            .get(&key, || async {
                let endpoint = format!("BinaryFiles?$filter={}", filter(query));
                let files: Vec<BinaryFile> = self.api.get_json(&endpoint).await?;
                Ok::<_, crate::Error>(self.process_all(files))
            })
            .await?;
        Ok(files)
    }

    async fn find_one(&self, endpoint: String) -> Result<Option<BinaryFile>> {
        let files: Vec<BinaryFile> = self.api.get_json(&endpoint).await?;
        Ok(files
            .into_iter()
            .next()
            .map(|file| process_file(file, &self.api.settings().base_url)))
    }

    fn process_all(&self, files: Vec<BinaryFile>) -> Arc<[BinaryFile]> {
        let base_url = &self.api.settings().base_url;
        files.into_iter().map(|file| process_file(file, base_url)).collect()
    }
}

/// Builds an OData filter that requires every field of `query` to equal its value.
fn filter(query: &Map<String, Value>) -> String {
    let mut fields: Vec<_> = query.iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));
    fields
        .into_iter()
        .map(|(field, value)| {
            let literal = match value {
                Value::String(s) => odata_string(s),
                other => other.to_string(),
            };
            format!("{field} eq {literal}")
        })
        .collect::<Vec<_>>()
        .join(" and ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> BinaryFile {
        BinaryFile {
            path: Some(path.to_string()),
            ..BinaryFile::default()
        }
    }

    #[test]
    fn relative_path_gets_base_url() {
        let processed = process_file(file("~/GetImage.ashx?id=7"), "https://rock.example.com/");
        assert_eq!(processed.path.as_deref(), Some("https://rock.example.com/GetImage.ashx"));
    }

    #[test]
    fn absolute_path_only_loses_query() {
        let processed = process_file(file("https://cdn.example.com/a.jpg?v=2"), "https://rock.example.com/");
        assert_eq!(processed.path.as_deref(), Some("https://cdn.example.com/a.jpg"));

        let untouched = process_file(file("https://cdn.example.com/a.jpg"), "https://rock.example.com/");
        assert_eq!(untouched.path.as_deref(), Some("https://cdn.example.com/a.jpg"));
    }

    #[test]
    fn short_relative_path() {
        assert_eq!(process_file(file("~"), "https://r/").path.as_deref(), Some("https://r/"));
        assert_eq!(process_file(BinaryFile::default(), "https://r/").path, None);
    }

    #[test]
    fn filter_is_sorted_and_quoted() {
        let query = serde_json::json!({ "MimeType": "image/jpeg", "IsTemporary": false, "FileName": "o'neil.jpg" });
        let Value::Object(query) = query else { unreachable!() };
        assert_eq!(
            filter(&query),
            "FileName eq 'o''neil.jpg' and IsTemporary eq false and MimeType eq 'image/jpeg'"
        );
    }

    #[test]
    fn deserializes_rock_record() {
        let file: BinaryFile = serde_json::from_value(serde_json::json!({
            "Id": 7,
            "Guid": "2f5e4b8c-0f3a-4b1e-9a61-0c3d7f0e9b11",
            "FileName": "ada.jpg",
            "MimeType": "image/jpeg",
            "Path": "~/GetImage.ashx?id=7",
            "IsTemporary": false
        }))
        .unwrap();
        assert_eq!(file.id, 7);
        assert_eq!(file.file_name.as_deref(), Some("ada.jpg"));
        assert!(file.guid.is_some());
    }
}
