//! Row filters applied by the cleaning step.
//!
//! Each filter turns one or more numeric columns into a boolean mask and the
//! table keeps the rows where the mask is true. The price and geography
//! filters read disjoint columns, so their order does not change the result.

use tracing::info;

use crate::error::{CleaningError, Result};
use crate::table::Table;

pub const PRICE_COLUMN: &str = "price";
pub const LONGITUDE_COLUMN: &str = "longitude";
pub const LATITUDE_COLUMN: &str = "latitude";

/// Closed interval test. NaN never falls inside.
pub fn between(value: f64, low: f64, high: f64) -> bool {
    value >= low && value <= high
}

/// Inclusive `[min, max]` bounds on the `price` column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
    min: f64,
    max: f64,
}

impl PriceRange {
    /// Rejects inverted or NaN bounds instead of producing an empty table.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(CleaningError::InvalidPriceRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, price: f64) -> bool {
        between(price, self.min, self.max)
    }
}

/// Rectangular longitude/latitude region, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_longitude: f64,
    pub max_longitude: f64,
    pub min_latitude: f64,
    pub max_latitude: f64,
}

/// New York City metropolitan area.
pub const NYC_BOUNDING_BOX: BoundingBox = BoundingBox {
    min_longitude: -74.25,
    max_longitude: -73.50,
    min_latitude: 40.5,
    max_latitude: 41.2,
};

impl BoundingBox {
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        between(longitude, self.min_longitude, self.max_longitude)
            && between(latitude, self.min_latitude, self.max_latitude)
    }
}

/// Keep rows whose price lies within `range`. Returns the number of rows dropped.
pub fn filter_price(table: &mut Table, range: &PriceRange) -> Result<usize> {
    let prices = table.numeric_column(PRICE_COLUMN)?;
    let mask: Vec<bool> = prices.iter().map(|p| range.contains(*p)).collect();
    Ok(apply_mask(table, &mask, "price"))
}

/// Keep rows whose coordinates fall inside `bbox`. Returns the number of rows dropped.
pub fn filter_bounding_box(table: &mut Table, bbox: &BoundingBox) -> Result<usize> {
    let longitudes = table.numeric_column(LONGITUDE_COLUMN)?;
    let latitudes = table.numeric_column(LATITUDE_COLUMN)?;
    let mask: Vec<bool> = longitudes
        .iter()
        .zip(&latitudes)
        .map(|(lon, lat)| bbox.contains(*lon, *lat))
        .collect();
    Ok(apply_mask(table, &mask, "bounding_box"))
}

fn apply_mask(table: &mut Table, mask: &[bool], filter: &str) -> usize {
    let before = table.len();
    table.retain_mask(mask);
    let dropped = before - table.len();
    info!(filter, before, kept = table.len(), dropped, "Applied row filter");
    dropped
}
