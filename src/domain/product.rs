use chrono::NaiveDate;
use non_empty_string::NonEmptyString;

use crate::domain::{
    ProductId,
    fields::{self, Collector, FieldError},
};

const TEXT_MAX: usize = 200;

/// A product that network units can carry.
///
/// Products are plain records: they have no relationships of their own and
/// are referenced by units through [`ProductId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub(crate) id: ProductId,
    pub(crate) name: NonEmptyString,
    pub(crate) model: NonEmptyString,
    pub(crate) release_date: NaiveDate,
}

impl Product {
    /// The product's identifier.
    #[must_use]
    pub const fn id(&self) -> ProductId {
        self.id
    }

    /// Product name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Model designation.
    #[must_use]
    pub fn model(&self) -> &str {
        self.model.as_str()
    }

    /// Date the product went on the market.
    #[must_use]
    pub const fn release_date(&self) -> NaiveDate {
        self.release_date
    }
}

/// The fields supplied when creating a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    /// Product name.
    pub name: String,
    /// Model designation.
    pub model: String,
    /// Release date.
    pub release_date: NaiveDate,
}

impl NewProduct {
    pub(crate) fn into_product(
        self,
        id: ProductId,
    ) -> Result<Product, nonempty::NonEmpty<FieldError>> {
        ProductPatch {
            name: Some(self.name),
            model: Some(self.model),
            release_date: Some(self.release_date),
        }
        .build(id, None, self.release_date)
    }
}

/// A partial update to a product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductPatch {
    /// New name.
    pub name: Option<String>,
    /// New model designation.
    pub model: Option<String>,
    /// New release date.
    pub release_date: Option<NaiveDate>,
}

impl ProductPatch {
    pub(crate) fn apply(
        &self,
        current: &Product,
    ) -> Result<Product, nonempty::NonEmpty<FieldError>> {
        let release_date = self.release_date.unwrap_or(current.release_date);
        self.build(current.id, Some(current), release_date)
    }

    fn build(
        &self,
        id: ProductId,
        current: Option<&Product>,
        release_date: NaiveDate,
    ) -> Result<Product, nonempty::NonEmpty<FieldError>> {
        let mut errors = Collector::default();

        let name = match (&self.name, current) {
            (Some(name), _) => errors.check(fields::text("name", name, TEXT_MAX)),
            (None, Some(current)) => Some(current.name.clone()),
            (None, None) => errors.check(fields::text("name", "", TEXT_MAX)),
        };
        let model = match (&self.model, current) {
            (Some(model), _) => errors.check(fields::text("model", model, TEXT_MAX)),
            (None, Some(current)) => Some(current.model.clone()),
            (None, None) => errors.check(fields::text("model", "", TEXT_MAX)),
        };
        errors.finish()?;

        match (name, model) {
            (Some(name), Some(model)) => Ok(Product {
                id,
                name,
                model,
                release_date,
            }),
            _ => unreachable!("collector reported no errors"),
        }
    }
}
