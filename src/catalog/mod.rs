pub mod browse_requests;
pub mod catalog_source;
pub mod change_fanout;
pub mod library_tree;
pub mod media_catalog;

pub use browse_requests::{BrowseOutcome, BrowseRequests};
pub use catalog_source::{CatalogSource, CatalogSourceError, InMemoryCatalogSource, LibrarySnapshot};
pub use change_fanout::{invalidated_parents, ChangeFanout};
pub use library_tree::build_library_catalog;
pub use media_catalog::{CatalogBuildError, MediaCatalog, SearchExtras, TypeNode};
