use ndarray::{Array2, ArrayView1};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::{Song, AUDIO_FEATURES},
    services::catalog::Catalog,
};

/// How song attributes are turned into vectors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureEncoding {
    /// Rescale each attribute to [0, 1] over the catalog
    #[default]
    #[serde(rename = "minmax", alias = "min_max")]
    MinMax,
    /// Use the published values unchanged
    Raw,
}

/// Maps a song to a fixed-width numeric vector
pub trait FeatureEncoder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn encode(&self, song: &Song) -> Vec<f64>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RawEncoder;

impl FeatureEncoder for RawEncoder {
    fn dimensions(&self) -> usize {
        AUDIO_FEATURES.len()
    }

    fn encode(&self, song: &Song) -> Vec<f64> {
        song.features.to_vec()
    }
}

/// Per-dimension min/max scaling fitted on a catalog.
///
/// A dimension with no spread maps every value to 0.5.
#[derive(Debug, Clone)]
pub struct MinMaxEncoder {
    mins: Vec<f64>,
    maxs: Vec<f64>,
}

impl MinMaxEncoder {
    pub fn fit(catalog: &Catalog) -> Self {
        let width = AUDIO_FEATURES.len();
        let mut mins = vec![f64::INFINITY; width];
        let mut maxs = vec![f64::NEG_INFINITY; width];

        for song in catalog.songs() {
            for (i, value) in song.features.to_vec().into_iter().enumerate() {
                mins[i] = mins[i].min(value);
                maxs[i] = maxs[i].max(value);
            }
        }

        Self { mins, maxs }
    }
}

impl FeatureEncoder for MinMaxEncoder {
    fn dimensions(&self) -> usize {
        self.mins.len()
    }

    fn encode(&self, song: &Song) -> Vec<f64> {
        song.features
            .to_vec()
            .into_iter()
            .zip(self.mins.iter().zip(&self.maxs))
            .map(|(value, (min, max))| {
                let span = max - min;
                if span.is_finite() && span > 0.0 {
                    ((value - min) / span).clamp(0.0, 1.0)
                } else {
                    0.5
                }
            })
            .collect()
    }
}

/// Builds the encoder selected by configuration
pub fn build_encoder(encoding: FeatureEncoding, catalog: &Catalog) -> Box<dyn FeatureEncoder> {
    match encoding {
        FeatureEncoding::MinMax => Box::new(MinMaxEncoder::fit(catalog)),
        FeatureEncoding::Raw => Box::new(RawEncoder),
    }
}

/// Dense matrix of encoded songs, one row per catalog index
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    data: Array2<f64>,
}

impl FeatureMatrix {
    /// Builds a matrix from rows that must all be `dimensions` wide
    pub fn from_rows(dimensions: usize, rows: Vec<Vec<f64>>) -> AppResult<Self> {
        let count = rows.len();
        let mut flat = Vec::with_capacity(count * dimensions);
        for row in rows {
            if row.len() != dimensions {
                return Err(AppError::DimensionMismatch {
                    expected: dimensions,
                    found: row.len(),
                });
            }
            flat.extend(row);
        }

        let data = Array2::from_shape_vec((count, dimensions), flat)
            .map_err(|e| AppError::Internal(format!("Feature matrix shape: {}", e)))?;
        Ok(Self { data })
    }

    pub fn encode_catalog(catalog: &Catalog, encoder: &dyn FeatureEncoder) -> AppResult<Self> {
        let rows = catalog.songs().iter().map(|s| encoder.encode(s)).collect();
        let matrix = Self::from_rows(encoder.dimensions(), rows)?;
        tracing::debug!(
            rows = matrix.rows(),
            dimensions = matrix.dimensions(),
            "Encoded catalog features"
        );
        Ok(matrix)
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn dimensions(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    pub fn row(&self, index: usize) -> Option<ArrayView1<'_, f64>> {
        (index < self.rows()).then(|| self.data.row(index))
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::song::test_song;

    fn catalog() -> Catalog {
        Catalog::from_songs(vec![
            test_song("a", "pop", [0.2, 0.5, 0.1, 0.4, 80.0]),
            test_song("b", "pop", [0.6, 0.5, 0.3, 0.8, 160.0]),
            test_song("c", "rock", [1.0, 0.5, 0.5, 0.6, 120.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_raw_encoder_passes_values_through() {
        let catalog = catalog();
        let encoded = RawEncoder.encode(catalog.get_song("b").unwrap());
        assert_eq!(encoded, vec![0.6, 0.5, 0.3, 0.8, 160.0]);
    }

    #[test]
    fn test_minmax_scales_to_unit_range() {
        let catalog = catalog();
        let encoder = MinMaxEncoder::fit(&catalog);
        let a = encoder.encode(catalog.get_song("a").unwrap());
        let c = encoder.encode(catalog.get_song("c").unwrap());

        assert_eq!(a[0], 0.0);
        assert_eq!(c[0], 1.0);
        assert_eq!(a[4], 0.0);
        assert_eq!(c[4], 0.5);
        // energy is constant across the catalog
        assert_eq!(a[1], 0.5);
        assert_eq!(c[1], 0.5);
    }

    #[test]
    fn test_encode_catalog_builds_matrix() {
        let catalog = catalog();
        let matrix = FeatureMatrix::encode_catalog(&catalog, &RawEncoder).unwrap();
        assert_eq!(matrix.rows(), 3);
        assert_eq!(matrix.dimensions(), 5);
        assert_eq!(matrix.row(1).unwrap()[4], 160.0);
        assert!(matrix.row(3).is_none());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = FeatureMatrix::from_rows(2, vec![vec![1.0, 0.0], vec![1.0]]);
        assert!(matches!(
            result,
            Err(AppError::DimensionMismatch {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn test_encoding_from_config_value() {
        #[derive(Deserialize)]
        struct Holder {
            encoding: FeatureEncoding,
        }
        let parsed: Holder = serde_json::from_str(r#"{"encoding":"minmax"}"#).unwrap();
        assert_eq!(parsed.encoding, FeatureEncoding::MinMax);
        let parsed: Holder = serde_json::from_str(r#"{"encoding":"raw"}"#).unwrap();
        assert_eq!(parsed.encoding, FeatureEncoding::Raw);
    }
}
