//! YAML serialization for unit and product records.
//!
//! Each record lives in its own file, named after its id. The file body is a
//! YAML mapping tagged with a `_version` so that the on-disk format can
//! evolve without breaking existing directories.

use std::{
    collections::BTreeSet,
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::Path,
};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::domain::{
    Debt, FieldError, InvalidIdError, NewProduct, NewUnit, Product, ProductId, Unit, UnitData,
    UnitId,
};

/// Errors that can occur when loading a record file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The record file was not found.
    #[error("record file not found")]
    NotFound,
    /// An I/O error occurred.
    #[error("failed to read record: {0}")]
    Io(#[from] io::Error),
    /// The YAML could not be parsed.
    #[error("failed to parse record: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// The file name is not a valid id.
    #[error(transparent)]
    Id(#[from] InvalidIdError),
    /// A field of the record holds an invalid value.
    #[error("invalid record: {}", join_fields(.0))]
    Fields(nonempty::NonEmpty<FieldError>),
}

impl From<nonempty::NonEmpty<FieldError>> for LoadError {
    fn from(errors: nonempty::NonEmpty<FieldError>) -> Self {
        Self::Fields(errors)
    }
}

fn join_fields(errors: &nonempty::NonEmpty<FieldError>) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A unit as stored on disk. The id is carried by the file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "UnitVersion", into = "UnitVersion")]
pub(crate) struct UnitRecord {
    name: String,
    email: String,
    country: String,
    city: String,
    street: String,
    building: String,
    products: BTreeSet<ProductId>,
    supplier: Option<UnitId>,
    debt: Debt,
    created: DateTime<Utc>,
}

impl UnitRecord {
    /// Validate the record and split it into unit data and the supplier
    /// edge.
    pub(crate) fn into_parts(self, id: UnitId) -> Result<(UnitData, Option<UnitId>), LoadError> {
        let mut data = NewUnit {
            id: Some(id),
            name: self.name,
            email: self.email,
            country: self.country,
            city: self.city,
            street: self.street,
            building: self.building,
            products: self.products,
            supplier: self.supplier,
        }
        .into_data()?;
        data.debt = self.debt;
        data.created = self.created;
        Ok((data, self.supplier))
    }
}

impl From<&Unit> for UnitRecord {
    fn from(unit: &Unit) -> Self {
        let contacts = unit.contacts();
        Self {
            name: unit.name().to_string(),
            email: contacts.email.to_string(),
            country: contacts.country.to_string(),
            city: contacts.city.to_string(),
            street: contacts.street.to_string(),
            building: contacts.building.to_string(),
            products: unit.products().clone(),
            supplier: unit.supplier(),
            debt: unit.debt(),
            created: unit.created(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum UnitVersion {
    #[serde(rename = "1")]
    V1 {
        name: String,
        email: String,
        country: String,
        city: String,
        street: String,
        building: String,
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        products: BTreeSet<ProductId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        supplier: Option<UnitId>,
        #[serde(default)]
        debt: Debt,
        created: DateTime<Utc>,
    },
}

impl From<UnitVersion> for UnitRecord {
    fn from(version: UnitVersion) -> Self {
        match version {
            UnitVersion::V1 {
                name,
                email,
                country,
                city,
                street,
                building,
                products,
                supplier,
                debt,
                created,
            } => Self {
                name,
                email,
                country,
                city,
                street,
                building,
                products,
                supplier,
                debt,
                created,
            },
        }
    }
}

impl From<UnitRecord> for UnitVersion {
    fn from(record: UnitRecord) -> Self {
        Self::V1 {
            name: record.name,
            email: record.email,
            country: record.country,
            city: record.city,
            street: record.street,
            building: record.building,
            products: record.products,
            supplier: record.supplier,
            debt: record.debt,
            created: record.created,
        }
    }
}

/// A product as stored on disk. The id is carried by the file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ProductVersion", into = "ProductVersion")]
pub(crate) struct ProductRecord {
    name: String,
    model: String,
    release_date: NaiveDate,
}

impl ProductRecord {
    pub(crate) fn into_product(self, id: ProductId) -> Result<Product, LoadError> {
        Ok(NewProduct {
            name: self.name,
            model: self.model,
            release_date: self.release_date,
        }
        .into_product(id)?)
    }
}

impl From<&Product> for ProductRecord {
    fn from(product: &Product) -> Self {
        Self {
            name: product.name().to_string(),
            model: product.model().to_string(),
            release_date: product.release_date(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum ProductVersion {
    #[serde(rename = "1")]
    V1 {
        name: String,
        model: String,
        release_date: NaiveDate,
    },
}

impl From<ProductVersion> for ProductRecord {
    fn from(version: ProductVersion) -> Self {
        match version {
            ProductVersion::V1 {
                name,
                model,
                release_date,
            } => Self {
                name,
                model,
                release_date,
            },
        }
    }
}

impl From<ProductRecord> for ProductVersion {
    fn from(record: ProductRecord) -> Self {
        Self::V1 {
            name: record.name,
            model: record.model,
            release_date: record.release_date,
        }
    }
}

/// Read a record from a YAML file.
pub(crate) fn read<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let file = File::open(path).map_err(|io_error| match io_error.kind() {
        io::ErrorKind::NotFound => LoadError::NotFound,
        _ => LoadError::Io(io_error),
    })?;
    Ok(serde_yaml::from_reader(BufReader::new(file))?)
}

/// Write a record to a YAML file.
///
/// Parent directories are created automatically if they don't exist.
pub(crate) fn write<T: Serialize>(path: &Path, record: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_yaml::to_writer(&mut writer, record).map_err(io::Error::other)?;
    writer.flush()
}

/// Parse the id from a record file name such as `units/12.yaml`.
///
/// Only the canonical spelling is accepted, so `012.yaml` cannot shadow
/// `12.yaml`.
pub(crate) fn id_from_path<T>(path: &Path) -> Result<T, InvalidIdError>
where
    T: std::str::FromStr<Err = InvalidIdError> + std::fmt::Display,
{
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    let id: T = stem.parse()?;
    if id.to_string() == stem {
        Ok(id)
    } else {
        Err(InvalidIdError::new(stem))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    const UNIT_YAML: &str = r"_version: '1'
name: РозеткаMix
email: mix@retail.us
country: USA
city: NYC
street: Broadway
building: '10'
products:
- 1
- 2
supplier: 1
debt: '1500.25'
created: 2025-01-01T00:00:00Z
";

    #[test]
    fn reads_unit_record() {
        let record: UnitRecord = serde_yaml::from_str(UNIT_YAML).unwrap();
        let id = UnitId::try_from(3).unwrap();
        let (data, supplier) = record.into_parts(id).unwrap();

        assert_eq!(data.name.as_str(), "РозеткаMix");
        assert_eq!(data.contacts.building.as_str(), "10");
        assert_eq!(data.products.len(), 2);
        assert_eq!(data.debt, Debt::from_cents(150_025));
        assert_eq!(supplier, Some(UnitId::MIN));
    }

    #[test]
    fn root_unit_omits_supplier() {
        let unit = Unit::from_parts(
            UnitId::MIN,
            serde_yaml::from_str::<UnitRecord>(UNIT_YAML)
                .unwrap()
                .into_parts(UnitId::MIN)
                .unwrap()
                .0,
            None,
        );
        let yaml = serde_yaml::to_string(&UnitRecord::from(&unit)).unwrap();

        assert!(yaml.starts_with("_version: '1'"));
        assert!(!yaml.contains("supplier"));
    }

    #[test]
    fn missing_debt_defaults_to_zero() {
        let yaml = UNIT_YAML.replace("debt: '1500.25'\n", "");
        let record: UnitRecord = serde_yaml::from_str(&yaml).unwrap();
        let (data, _) = record.into_parts(UnitId::MIN).unwrap();
        assert!(data.debt.is_zero());
    }

    #[test]
    fn invalid_field_is_reported() {
        let yaml = UNIT_YAML.replace("mix@retail.us", "not-an-email");
        let record: UnitRecord = serde_yaml::from_str(&yaml).unwrap();
        let error = record.into_parts(UnitId::MIN).unwrap_err();
        assert!(matches!(error, LoadError::Fields(_)));
        assert_eq!(
            error.to_string(),
            "invalid record: email: enter a valid email address"
        );
    }

    #[test]
    fn unknown_version_is_rejected() {
        let yaml = UNIT_YAML.replace("_version: '1'", "_version: '9'");
        assert!(serde_yaml::from_str::<UnitRecord>(&yaml).is_err());
    }

    #[test]
    fn id_is_taken_from_file_stem() {
        let id: UnitId = id_from_path(&PathBuf::from("units/42.yaml")).unwrap();
        assert_eq!(id.get(), 42);
        assert!(id_from_path::<UnitId>(&PathBuf::from("units/notes.yaml")).is_err());
        assert!(id_from_path::<UnitId>(&PathBuf::from("units/042.yaml")).is_err());
    }

    #[test]
    fn write_then_read_product() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("products").join("1.yaml");
        let product = NewProduct {
            name: "Космофон X".to_string(),
            model: "COSMO-X".to_string(),
            release_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        }
        .into_product(ProductId::MIN)
        .unwrap();

        write(&path, &ProductRecord::from(&product)).unwrap();
        let loaded = read::<ProductRecord>(&path)
            .unwrap()
            .into_product(ProductId::MIN)
            .unwrap();

        assert_eq!(loaded, product);
    }

    #[test]
    fn reading_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let error = read::<ProductRecord>(&tmp.path().join("7.yaml")).unwrap_err();
        assert!(matches!(error, LoadError::NotFound));
    }
}
