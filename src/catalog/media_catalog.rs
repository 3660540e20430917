//! Browse tree resolution.
//!
//! The tree has three levels below the root: Type nodes, Categories, and
//! playable leaves. Each Type owns uniquely named static Categories (each
//! with its own children provider) and at most one dynamic provider that
//! resolves category keys at lookup time. Nothing is cached here; every
//! call reads the catalog source again.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, trace};

use crate::catalog::catalog_source::CatalogSource;
use crate::media_id::MediaId;
use crate::protocol::CatalogItem;

/// Construction-time mistakes in the tree definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogBuildError {
    #[error("node name {0:?} is empty or contains a media id separator")]
    InvalidName(String),
    #[error("type {0:?} is already registered")]
    DuplicateType(String),
    #[error("type {media_type:?} already has a category named {category:?}")]
    DuplicateCategory { media_type: String, category: String },
    #[error("type {0:?} already has a dynamic category provider")]
    DuplicateDynamicProvider(String),
}

/// Children of one static category.
#[async_trait]
pub trait CategoryProvider: Send + Sync {
    /// `parent` is the `type/category` id being resolved.
    async fn children(&self, source: &dyn CatalogSource, parent: &MediaId) -> Vec<CatalogItem>;
}

/// Categories of a Type that are only known at lookup time.
#[async_trait]
pub trait DynamicCategoryProvider: Send + Sync {
    /// Item representations of every dynamic category under `parent` (a type id).
    async fn categories(&self, source: &dyn CatalogSource, parent: &MediaId)
        -> Vec<CatalogItem>;

    /// Children of the category keyed by `parent.category()`; `None` when the key
    /// does not resolve.
    async fn children(
        &self,
        source: &dyn CatalogSource,
        parent: &MediaId,
    ) -> Option<Vec<CatalogItem>>;
}

/// Optional filters applied by [`MediaCatalog::search`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct SearchExtras {
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        source: &dyn CatalogSource,
        query: &str,
        extras: &SearchExtras,
    ) -> Vec<CatalogItem>;
}

fn validate_name(name: &str) -> Result<(), CatalogBuildError> {
    if name.is_empty() || name.contains('/') || name.contains('|') {
        return Err(CatalogBuildError::InvalidName(name.to_string()));
    }
    Ok(())
}

struct StaticCategory {
    name: String,
    title: String,
    subtitle: String,
    provider: Box<dyn CategoryProvider>,
}

/// One top-level kind in the browse tree.
pub struct TypeNode {
    name: String,
    title: String,
    subtitle: String,
    categories: Vec<StaticCategory>,
    dynamic: Option<Box<dyn DynamicCategoryProvider>>,
}

impl TypeNode {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            subtitle: String::new(),
            categories: Vec::new(),
            dynamic: None,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    /// Adds a static category. Names must be unique within the type.
    pub fn with_category(
        mut self,
        name: impl Into<String>,
        title: impl Into<String>,
        subtitle: impl Into<String>,
        provider: impl CategoryProvider + 'static,
    ) -> Result<Self, CatalogBuildError> {
        let name = name.into();
        validate_name(&name)?;
        if self.categories.iter().any(|category| category.name == name) {
            return Err(CatalogBuildError::DuplicateCategory {
                media_type: self.name.clone(),
                category: name,
            });
        }
        self.categories.push(StaticCategory {
            name,
            title: title.into(),
            subtitle: subtitle.into(),
            provider: Box::new(provider),
        });
        Ok(self)
    }

    pub fn with_dynamic_categories(
        mut self,
        provider: impl DynamicCategoryProvider + 'static,
    ) -> Result<Self, CatalogBuildError> {
        if self.dynamic.is_some() {
            return Err(CatalogBuildError::DuplicateDynamicProvider(self.name.clone()));
        }
        self.dynamic = Some(Box::new(provider));
        Ok(self)
    }

    fn item(&self) -> CatalogItem {
        CatalogItem::browsable(
            MediaId::of_type(&self.name),
            &self.title,
            &self.subtitle,
            None,
        )
    }

    fn category_items(&self) -> impl Iterator<Item = CatalogItem> + '_ {
        self.categories.iter().map(|category| {
            CatalogItem::browsable(
                MediaId::of_category(&self.name, &category.name),
                &category.title,
                &category.subtitle,
                None,
            )
        })
    }

    fn find_category(&self, name: &str) -> Option<&StaticCategory> {
        self.categories.iter().find(|category| category.name == name)
    }
}

/// Resolves media ids against the registered tree.
pub struct MediaCatalog {
    source: Arc<dyn CatalogSource>,
    types: Vec<TypeNode>,
    search: Option<Box<dyn SearchProvider>>,
}

impl MediaCatalog {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            types: Vec::new(),
            search: None,
        }
    }

    /// Registers a Type node; the root lists types in registration order.
    pub fn register_type(&mut self, node: TypeNode) -> Result<(), CatalogBuildError> {
        validate_name(&node.name)?;
        if self.types.iter().any(|existing| existing.name == node.name) {
            return Err(CatalogBuildError::DuplicateType(node.name));
        }
        debug!(
            "MediaCatalog: registered type {} ({} static categories, dynamic={})",
            node.name,
            node.categories.len(),
            node.dynamic.is_some()
        );
        self.types.push(node);
        Ok(())
    }

    pub fn set_search_provider(&mut self, provider: impl SearchProvider + 'static) {
        self.search = Some(Box::new(provider));
    }

    pub fn source(&self) -> &Arc<dyn CatalogSource> {
        &self.source
    }

    fn find_type(&self, name: &str) -> Option<&TypeNode> {
        self.types.iter().find(|node| node.name == name)
    }

    /// Children of `parent`, or `None` when `parent` is absent or not browsable.
    pub async fn get_children(&self, parent: &MediaId) -> Option<Vec<CatalogItem>> {
        if !parent.is_browsable() {
            return None;
        }
        let Some(media_type) = parent.media_type() else {
            return Some(self.types.iter().map(TypeNode::item).collect());
        };
        let node = self.find_type(media_type)?;
        let source = self.source.as_ref();

        let Some(category) = parent.category() else {
            let mut items: Vec<CatalogItem> = node.category_items().collect();
            if let Some(dynamic) = node.dynamic.as_ref() {
                items.extend(dynamic.categories(source, parent).await);
            }
            return Some(items);
        };

        if let Some(static_category) = node.find_category(category) {
            return Some(static_category.provider.children(source, parent).await);
        }

        let Some(dynamic) = node.dynamic.as_ref() else {
            trace!("MediaCatalog: {} has no category {}", media_type, category);
            return None;
        };
        dynamic.children(source, parent).await
    }

    /// Resolves a single node at any depth by scanning its parent's children.
    pub async fn get_item(&self, id: &MediaId) -> Option<CatalogItem> {
        let parent = id.parent()?;
        let siblings = self.get_children(&parent).await?;
        siblings.into_iter().find(|item| &item.media_id == id)
    }

    /// Playable leaves of the category `target` belongs to, in catalog order.
    pub async fn playable_leaves(&self, target: &MediaId) -> Option<Vec<CatalogItem>> {
        let category = target.browse_category()?;
        let children = self.get_children(&category).await?;
        Some(
            children
                .into_iter()
                .filter(CatalogItem::is_playable)
                .collect(),
        )
    }

    pub async fn search(&self, query: &str, extras: &SearchExtras) -> Vec<CatalogItem> {
        match self.search.as_ref() {
            Some(provider) => provider.search(self.source.as_ref(), query, extras).await,
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::catalog_source::{sample_library, InMemoryCatalogSource};
    use crate::protocol::CatalogItemKind;

    struct FixedChildren(Vec<&'static str>);

    #[async_trait]
    impl CategoryProvider for FixedChildren {
        async fn children(
            &self,
            _source: &dyn CatalogSource,
            parent: &MediaId,
        ) -> Vec<CatalogItem> {
            self.0
                .iter()
                .filter_map(|track| parent.with_track(*track))
                .map(|media_id| CatalogItem {
                    title: media_id.encode(),
                    media_id,
                    subtitle: String::new(),
                    artwork: None,
                    kind: CatalogItemKind::Playable {
                        duration_ms: 1_000,
                        disc_number: 1,
                        track_number: 1,
                        source: String::new(),
                    },
                })
                .collect()
        }
    }

    struct NumericKeys;

    #[async_trait]
    impl DynamicCategoryProvider for NumericKeys {
        async fn categories(
            &self,
            _source: &dyn CatalogSource,
            parent: &MediaId,
        ) -> Vec<CatalogItem> {
            let media_type = parent.media_type().unwrap_or_default();
            vec![CatalogItem::browsable(
                MediaId::of_category(media_type, "7"),
                "Seven",
                "",
                Some(1),
            )]
        }

        async fn children(
            &self,
            source: &dyn CatalogSource,
            parent: &MediaId,
        ) -> Option<Vec<CatalogItem>> {
            let key: u64 = parent.category()?.parse().ok()?;
            if key != 7 {
                return None;
            }
            Some(FixedChildren(vec!["70"]).children(source, parent).await)
        }
    }

    fn test_catalog() -> MediaCatalog {
        let source = Arc::new(InMemoryCatalogSource::new(sample_library()));
        let mut catalog = MediaCatalog::new(source);
        catalog
            .register_type(
                TypeNode::new("songs", "Songs")
                    .with_category("all", "All", "", FixedChildren(vec!["1", "2", "3"]))
                    .expect("unique category"),
            )
            .expect("unique type");
        catalog
            .register_type(
                TypeNode::new("groups", "Groups")
                    .with_category("empty", "Empty", "", FixedChildren(Vec::new()))
                    .expect("unique category")
                    .with_dynamic_categories(NumericKeys)
                    .expect("single dynamic provider"),
            )
            .expect("unique type");
        catalog
    }

    fn ids(items: &[CatalogItem]) -> Vec<String> {
        items.iter().map(|item| item.media_id.encode()).collect()
    }

    #[tokio::test]
    async fn test_root_lists_types_in_registration_order() {
        let catalog = test_catalog();
        let children = catalog
            .get_children(&MediaId::root())
            .await
            .expect("root is browsable");
        assert_eq!(ids(&children), vec!["songs", "groups"]);
    }

    #[tokio::test]
    async fn test_type_lists_static_then_dynamic_categories() {
        let catalog = test_catalog();
        let children = catalog
            .get_children(&MediaId::of_type("groups"))
            .await
            .expect("type is browsable");
        assert_eq!(ids(&children), vec!["groups/empty", "groups/7"]);
    }

    #[tokio::test]
    async fn test_empty_category_is_distinct_from_missing_one() {
        let catalog = test_catalog();
        let empty = catalog
            .get_children(&MediaId::of_category("groups", "empty"))
            .await;
        assert_eq!(empty, Some(Vec::new()));
        assert_eq!(
            catalog
                .get_children(&MediaId::of_category("songs", "missing"))
                .await,
            None
        );
        assert_eq!(catalog.get_children(&MediaId::of_type("nope")).await, None);
    }

    #[tokio::test]
    async fn test_dynamic_key_that_does_not_resolve_is_none() {
        let catalog = test_catalog();
        assert_eq!(
            catalog
                .get_children(&MediaId::of_category("groups", "abc"))
                .await,
            None
        );
        assert_eq!(
            catalog
                .get_children(&MediaId::of_category("groups", "8"))
                .await,
            None
        );
        let resolved = catalog
            .get_children(&MediaId::of_category("groups", "7"))
            .await
            .expect("known key resolves");
        assert_eq!(ids(&resolved), vec!["groups/7|70"]);
    }

    #[tokio::test]
    async fn test_leaf_ids_are_never_browsable() {
        let catalog = test_catalog();
        assert_eq!(
            catalog
                .get_children(&MediaId::of_track("songs", "all", "1"))
                .await,
            None
        );
    }

    #[tokio::test]
    async fn test_get_item_resolves_every_depth() {
        let catalog = test_catalog();
        let leaf = catalog
            .get_item(&MediaId::of_track("songs", "all", "2"))
            .await
            .expect("leaf exists");
        assert!(leaf.is_playable());
        let category = catalog
            .get_item(&MediaId::of_category("groups", "7"))
            .await
            .expect("dynamic category exists");
        assert_eq!(category.title, "Seven");
        assert!(catalog
            .get_item(&MediaId::of_type("songs"))
            .await
            .is_some());
        assert!(catalog
            .get_item(&MediaId::of_track("songs", "all", "9"))
            .await
            .is_none());
        assert!(catalog.get_item(&MediaId::root()).await.is_none());
    }

    #[test]
    fn test_registration_rejects_duplicates_and_bad_names() {
        let duplicate_category = TypeNode::new("songs", "Songs")
            .with_category("all", "All", "", FixedChildren(Vec::new()))
            .and_then(|node| node.with_category("all", "Again", "", FixedChildren(Vec::new())));
        assert!(matches!(
            duplicate_category,
            Err(CatalogBuildError::DuplicateCategory { .. })
        ));

        let bad_name = TypeNode::new("songs", "Songs").with_category(
            "a|b",
            "Bad",
            "",
            FixedChildren(Vec::new()),
        );
        assert!(matches!(bad_name, Err(CatalogBuildError::InvalidName(_))));

        let mut catalog = test_catalog();
        assert_eq!(
            catalog.register_type(TypeNode::new("songs", "Again")),
            Err(CatalogBuildError::DuplicateType("songs".to_string()))
        );
    }

    #[tokio::test]
    async fn test_search_without_provider_is_empty() {
        let catalog = test_catalog();
        assert!(catalog
            .search("anything", &SearchExtras::default())
            .await
            .is_empty());
    }
}
