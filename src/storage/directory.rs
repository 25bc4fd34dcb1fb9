//! A filesystem backed store of units and products
//!
//! The [`Directory`] provides a way to manage records stored in a directory
//! structure. It is a wrapper around the filesystem agnostic [`Network`].
//!
//! Layout of a directory:
//!
//! ```text
//! root/
//! ├── config.toml
//! ├── units/<id>.yaml
//! └── products/<id>.yaml
//! ```

use std::{
    collections::BTreeSet,
    ffi::OsStr,
    fmt, io,
    path::{Path, PathBuf},
};

use nonempty::NonEmpty;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::instrument;
use walkdir::WalkDir;

use crate::{
    domain::{
        Config, Debt, HierarchyError, Network, Product, ProductId, SupplierGraph, Unit,
        UnitData, UnitId,
    },
    storage::record::{self, LoadError, ProductRecord, UnitRecord},
};

const UNITS_DIR: &str = "units";
const PRODUCTS_DIR: &str = "products";
const CONFIG_FILE: &str = "config.toml";
const EXTENSION: &str = "yaml";

/// A filesystem backed store of units and products.
///
/// Mutations are applied to the in-memory [`Network`] immediately and
/// written to disk by [`Directory::flush`].
#[derive(Debug)]
pub struct Directory {
    /// The root of the directory records are stored in.
    root: PathBuf,
    network: Network,
    config: Config,
    dirty_units: BTreeSet<UnitId>,
    dirty_products: BTreeSet<ProductId>,
}

impl Directory {
    /// Opens a directory at the given path and loads all records from disk.
    ///
    /// # Errors
    ///
    /// This method has different behaviour depending on the configuration file
    /// in the root. If `allow_unrecognised` is `true`, then any files that
    /// cannot be parsed as records are skipped. If `allow_unrecognised` is
    /// `false` (the default), then any such file returns an error.
    ///
    /// Supplier or product references to records that do not exist are
    /// always an error. A supplier graph that already contains a cycle is
    /// logged but still opened, so that it can be repaired.
    #[instrument(level = "debug")]
    pub fn new(root: PathBuf) -> Result<Self, DirectoryLoadError> {
        let config = load_config(&root);

        let unit_paths = collect_record_paths(&root.join(UNITS_DIR));
        let product_paths = collect_record_paths(&root.join(PRODUCTS_DIR));

        let (units, mut unrecognised): (Vec<_>, Vec<_>) =
            partition(unit_paths.par_iter().map(|path| try_load_unit(path)).collect());
        let (products, bad_products): (Vec<_>, Vec<_>) = partition(
            product_paths
                .par_iter()
                .map(|path| try_load_product(path))
                .collect(),
        );
        unrecognised.extend(bad_products);

        if !config.allow_unrecognised && !unrecognised.is_empty() {
            unrecognised.sort();
            return Err(DirectoryLoadError::UnrecognisedFiles(unrecognised));
        }

        let mut network = Network::with_capacity(units.len());
        for product in products {
            network.insert_product(product);
        }
        for (id, data, supplier) in units {
            network.insert_unit(id, data, supplier);
        }

        if let Some(&(unit, supplier)) = network.dangling_suppliers().first() {
            return Err(DirectoryLoadError::DanglingSupplier { unit, supplier });
        }
        if let Some(&(unit, product)) = network.dangling_products().first() {
            return Err(DirectoryLoadError::DanglingProduct { unit, product });
        }

        for cycle in network.cycles() {
            tracing::error!(
                units = ?cycle,
                "supplier hierarchy in {} contains a cycle",
                root.display()
            );
        }

        tracing::debug!(
            units = network.unit_count(),
            products = network.product_count(),
            "loaded directory {}",
            root.display()
        );

        Ok(Self {
            root,
            network,
            config,
            dirty_units: BTreeSet::new(),
            dirty_products: BTreeSet::new(),
        })
    }

    /// The root path of the directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The configuration loaded from `config.toml`, or the defaults.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The in-memory network.
    #[must_use]
    pub const fn network(&self) -> &Network {
        &self.network
    }

    /// Path of the file a unit is stored in.
    #[must_use]
    pub fn unit_path(&self, id: UnitId) -> PathBuf {
        self.root.join(UNITS_DIR).join(format!("{id}.{EXTENSION}"))
    }

    /// Path of the file a product is stored in.
    #[must_use]
    pub fn product_path(&self, id: ProductId) -> PathBuf {
        self.root
            .join(PRODUCTS_DIR)
            .join(format!("{id}.{EXTENSION}"))
    }

    /// Whether there are changes that have not been flushed to disk.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty_units.is_empty() || !self.dirty_products.is_empty()
    }

    /// Add a unit. The caller is responsible for having validated the
    /// supplier edge.
    pub(crate) fn insert_unit(&mut self, id: UnitId, data: UnitData, supplier: Option<UnitId>) {
        self.network.insert_unit(id, data, supplier);
        self.dirty_units.insert(id);
    }

    /// Change a unit's supplier edge. See [`Network::set_supplier`].
    pub(crate) fn set_supplier(
        &mut self,
        id: UnitId,
        supplier: Option<UnitId>,
    ) -> Result<Option<UnitId>, HierarchyError> {
        let previous = self.network.set_supplier(id, supplier)?;
        if previous != supplier {
            self.dirty_units.insert(id);
        }
        Ok(previous)
    }

    pub(crate) fn replace_unit_data(&mut self, id: UnitId, data: UnitData) -> Option<UnitData> {
        let previous = self.network.replace_unit_data(id, data)?;
        self.dirty_units.insert(id);
        Some(previous)
    }

    pub(crate) fn set_debt(&mut self, id: UnitId, debt: Debt) -> Option<Debt> {
        let previous = self.network.set_debt(id, debt)?;
        if previous != debt {
            self.dirty_units.insert(id);
        }
        Some(previous)
    }

    /// Remove a unit; its clients become roots and are rewritten.
    pub(crate) fn remove_unit(&mut self, id: UnitId) -> Option<(Unit, Vec<UnitId>)> {
        let (unit, clients) = self.network.remove_unit(id)?;
        self.dirty_units.insert(id);
        self.dirty_units.extend(clients.iter().copied());
        Some((unit, clients))
    }

    pub(crate) fn insert_product(&mut self, product: Product) {
        self.dirty_products.insert(product.id());
        self.network.insert_product(product);
    }

    pub(crate) fn replace_product(&mut self, product: Product) -> Option<Product> {
        let id = product.id();
        let previous = self.network.replace_product(product)?;
        self.dirty_products.insert(id);
        Some(previous)
    }

    /// Remove a product; units carrying it are rewritten.
    pub(crate) fn remove_product(&mut self, id: ProductId) -> Option<(Product, Vec<UnitId>)> {
        let (product, carriers) = self.network.remove_product(id)?;
        self.dirty_products.insert(id);
        self.dirty_units.extend(carriers.iter().copied());
        Some((product, carriers))
    }

    /// Capture the in-memory state so that a failed [`Directory::commit`]
    /// can return to it.
    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            network: self.network.clone(),
        }
    }

    /// Flush the changes made since `checkpoint`, or undo them.
    ///
    /// If any file cannot be written, the network is restored to the
    /// checkpoint and every record touched since is written again to match
    /// it. Records that still cannot be written stay dirty and are retried
    /// by the next flush.
    ///
    /// # Errors
    ///
    /// Returns the error of the first flush.
    pub(crate) fn commit(&mut self, checkpoint: Checkpoint) -> Result<usize, FlushError> {
        let touched_units = self.dirty_units.clone();
        let touched_products = self.dirty_products.clone();

        match self.flush() {
            Ok(written) => Ok(written),
            Err(error) => {
                self.network = checkpoint.network;
                self.dirty_units.extend(touched_units);
                self.dirty_products.extend(touched_products);
                if let Err(restore) = self.flush() {
                    tracing::error!("failed to restore records after a write error: {restore}");
                }
                Err(error)
            }
        }
    }

    /// Write all changed records to disk and delete the files of removed
    /// ones.
    ///
    /// Returns the number of files written or removed.
    ///
    /// # Errors
    ///
    /// Returns an error if some of the files cannot be written. This method
    /// does *not* fail fast: it attempts every file before returning, and
    /// records that failed stay dirty.
    #[instrument(level = "debug", skip(self))]
    pub fn flush(&mut self) -> Result<usize, FlushError> {
        let mut failures = Vec::new();
        let mut written = 0;

        let units = std::mem::take(&mut self.dirty_units);
        for id in units {
            let path = self.unit_path(id);
            let result = match self.network.unit(id) {
                Some(unit) => record::write(&path, &UnitRecord::from(&unit)),
                None => remove_file(&path),
            };
            match result {
                Ok(()) => written += 1,
                Err(e) => {
                    self.dirty_units.insert(id);
                    failures.push((path, e));
                }
            }
        }

        let products = std::mem::take(&mut self.dirty_products);
        for id in products {
            let path = self.product_path(id);
            let result = match self.network.product(id) {
                Some(product) => record::write(&path, &ProductRecord::from(product)),
                None => remove_file(&path),
            };
            match result {
                Ok(()) => written += 1,
                Err(e) => {
                    self.dirty_products.insert(id);
                    failures.push((path, e));
                }
            }
        }

        NonEmpty::from_vec(failures).map_or(Ok(written), |failures| Err(FlushError { failures }))
    }
}

/// Create an empty directory: the record folders and a default
/// `config.toml`.
///
/// # Errors
///
/// Returns an error if the directory already contains a configuration file,
/// or if any of the files cannot be created.
pub fn init(root: &Path) -> Result<(), InitError> {
    let config_path = root.join(CONFIG_FILE);
    if config_path.exists() {
        return Err(InitError::AlreadyInitialised(config_path));
    }

    std::fs::create_dir_all(root.join(UNITS_DIR))?;
    std::fs::create_dir_all(root.join(PRODUCTS_DIR))?;
    Config::default()
        .save(&config_path)
        .map_err(InitError::Config)?;

    Ok(())
}

/// Errors that can occur when initialising a directory.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// A configuration file already exists.
    #[error("directory already initialised (found {})", .0.display())]
    AlreadyInitialised(PathBuf),
    /// A folder could not be created.
    #[error("failed to create directory: {0}")]
    Io(#[from] io::Error),
    /// The configuration file could not be written.
    #[error("{0}")]
    Config(String),
}

/// Errors that can occur when loading a directory.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryLoadError {
    /// Files that could not be read as records.
    UnrecognisedFiles(Vec<PathBuf>),
    /// A unit names a supplier that does not exist.
    DanglingSupplier {
        /// The unit holding the reference.
        unit: UnitId,
        /// The missing supplier.
        supplier: UnitId,
    },
    /// A unit carries a product that does not exist.
    DanglingProduct {
        /// The unit holding the reference.
        unit: UnitId,
        /// The missing product.
        product: ProductId,
    },
}

impl fmt::Display for DirectoryLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognisedFiles(paths) => {
                write!(f, "Unrecognised files: ")?;
                for (i, path) in paths.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", path.display())?;
                }
                Ok(())
            }
            Self::DanglingSupplier { unit, supplier } => {
                write!(f, "unit {unit} references missing supplier {supplier}")
            }
            Self::DanglingProduct { unit, product } => {
                write!(f, "unit {unit} references missing product {product}")
            }
        }
    }
}

/// In-memory state saved by [`Directory::checkpoint`].
#[derive(Debug)]
pub(crate) struct Checkpoint {
    network: Network,
}

/// Some records could not be written to disk.
#[derive(Debug, thiserror::Error)]
pub struct FlushError {
    failures: NonEmpty<(PathBuf, io::Error)>,
}

impl fmt::Display for FlushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX_DISPLAY: usize = 5;

        write!(f, "failed to write records: ")?;

        let total = self.failures.len();

        let displayed_paths: Vec<String> = self
            .failures
            .iter()
            .take(MAX_DISPLAY)
            .map(|(p, e)| format!("{} ({e})", p.display()))
            .collect();

        let msg = displayed_paths.join(", ");

        if total <= MAX_DISPLAY {
            write!(f, "{msg}")
        } else {
            write!(f, "{msg}... (and {} more)", total - MAX_DISPLAY)
        }
    }
}

fn load_config(root: &Path) -> Config {
    let path = root.join(CONFIG_FILE);
    Config::load(&path).unwrap_or_else(|e| {
        tracing::debug!("Failed to load config: {e}");
        Config::default()
    })
}

fn collect_record_paths(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension() == Some(OsStr::new(EXTENSION)))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

fn partition<T>(results: Vec<Result<T, PathBuf>>) -> (Vec<T>, Vec<PathBuf>) {
    let mut ok = Vec::with_capacity(results.len());
    let mut failed = Vec::new();
    for result in results {
        match result {
            Ok(value) => ok.push(value),
            Err(path) => failed.push(path),
        }
    }
    (ok, failed)
}

fn try_load_unit(path: &Path) -> Result<(UnitId, UnitData, Option<UnitId>), PathBuf> {
    let load = || -> Result<_, LoadError> {
        let id: UnitId = record::id_from_path(path)?;
        let (data, supplier) = record::read::<UnitRecord>(path)?.into_parts(id)?;
        Ok((id, data, supplier))
    };

    load().map_err(|e| {
        tracing::debug!("Skipping unit file {}: {e}", path.display());
        path.to_path_buf()
    })
}

fn try_load_product(path: &Path) -> Result<Product, PathBuf> {
    let load = || -> Result<_, LoadError> {
        let id: ProductId = record::id_from_path(path)?;
        record::read::<ProductRecord>(path)?.into_product(id)
    };

    load().map_err(|e| {
        tracing::debug!("Skipping product file {}: {e}", path.display());
        path.to_path_buf()
    })
}

fn remove_file(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}
