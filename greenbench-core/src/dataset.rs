// Copyright 2025 Greenbench Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Ground truth image set loading

use crate::{GreenbenchError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single labeled image in the shared benchmark set.
///
/// Immutable once loaded; supplied as an ordered sequence for a comparison run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthImage {
    /// Image path or URL
    pub uri: String,
    /// Human-labeled expected object count
    pub expected_count: u32,
    /// Optional free-text description
    pub description: Option<String>,
}

impl GroundTruthImage {
    pub fn new(uri: impl Into<String>, expected_count: u32) -> Self {
        Self {
            uri: uri.into(),
            expected_count,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Row layout of the external ground truth CSV: `image_path,car_count,description`
#[derive(Debug, Deserialize)]
struct GroundTruthRow {
    image_path: String,
    car_count: u32,
    description: Option<String>,
}

/// Load a ground truth image set from a CSV file.
///
/// Expects a header row with columns `image_path,car_count,description`.
/// An empty description column maps to `None`.
pub fn load_ground_truth_csv<P: AsRef<Path>>(path: P) -> Result<Vec<GroundTruthImage>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;

    let mut images = Vec::new();
    for row in reader.deserialize() {
        let row: GroundTruthRow = row?;
        if row.image_path.is_empty() {
            return Err(GreenbenchError::Dataset(
                "image_path column must not be empty".to_string(),
            ));
        }
        images.push(GroundTruthImage {
            uri: row.image_path,
            expected_count: row.car_count,
            description: row.description.filter(|d| !d.is_empty()),
        });
    }

    if images.is_empty() {
        return Err(GreenbenchError::Dataset(
            "ground truth CSV contains no rows".to_string(),
        ));
    }

    log::info!("Loaded {} ground truth images", images.len());
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_csv() {
        let file = write_csv(
            "image_path,car_count,description\n\
             images/lot_a.jpg,3,parking lot\n\
             images/street.jpg,1,\n",
        );

        let images = load_ground_truth_csv(file.path()).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].uri, "images/lot_a.jpg");
        assert_eq!(images[0].expected_count, 3);
        assert_eq!(images[0].description.as_deref(), Some("parking lot"));
        assert_eq!(images[1].expected_count, 1);
        assert!(images[1].description.is_none());
    }

    #[test]
    fn test_empty_csv_rejected() {
        let file = write_csv("image_path,car_count,description\n");
        assert!(load_ground_truth_csv(file.path()).is_err());
    }

    #[test]
    fn test_malformed_count_rejected() {
        let file = write_csv(
            "image_path,car_count,description\n\
             images/a.jpg,not_a_number,\n",
        );
        assert!(load_ground_truth_csv(file.path()).is_err());
    }
}
