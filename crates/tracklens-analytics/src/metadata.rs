//! Metadata descriptor cache and the per-request `metaData.items` registry.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracklens_core::{
    AggregationType, AnalyticsDateTime, DataElement, NamedObject, OptionItem, OptionSet,
    OrganisationUnit, Program, ProgramIndicator, ProgramStage, TrackedEntityAttribute,
    TrackedEntityType, ValueType,
};
use tracklens_storage::{DynMetadataStore, StorageResult};

use crate::period::{Period, RelativePeriod};

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Lazily populated, read-mostly descriptor cache shared across requests.
///
/// Lookups that miss go to the metadata store; unknown UIDs are not cached.
pub struct MetadataCache {
    store: DynMetadataStore,
    programs: DashMap<String, Arc<Program>>,
    stages: DashMap<String, Arc<ProgramStage>>,
    data_elements: DashMap<String, Arc<DataElement>>,
    attributes: DashMap<String, Arc<TrackedEntityAttribute>>,
    option_sets: DashMap<String, Arc<OptionSet>>,
    indicators: DashMap<String, Arc<ProgramIndicator>>,
    tracked_entity_types: DashMap<String, Arc<TrackedEntityType>>,
    org_units: DashMap<String, Arc<OrganisationUnit>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MetadataCache {
    pub fn new(store: DynMetadataStore) -> Self {
        Self {
            store,
            programs: DashMap::new(),
            stages: DashMap::new(),
            data_elements: DashMap::new(),
            attributes: DashMap::new(),
            option_sets: DashMap::new(),
            indicators: DashMap::new(),
            tracked_entity_types: DashMap::new(),
            org_units: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    async fn cached<T, F>(
        &self,
        map: &DashMap<String, Arc<T>>,
        uid: &str,
        load: F,
    ) -> StorageResult<Option<Arc<T>>>
    where
        F: Future<Output = StorageResult<Option<T>>>,
    {
        if let Some(hit) = map.get(uid).map(|entry| Arc::clone(entry.value())) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(hit));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let Some(loaded) = load.await? else {
            return Ok(None);
        };
        let loaded = Arc::new(loaded);
        map.insert(uid.to_string(), Arc::clone(&loaded));
        Ok(Some(loaded))
    }

    pub async fn program(&self, uid: &str) -> StorageResult<Option<Arc<Program>>> {
        self.cached(&self.programs, uid, self.store.program(uid)).await
    }

    pub async fn program_stage(&self, uid: &str) -> StorageResult<Option<Arc<ProgramStage>>> {
        self.cached(&self.stages, uid, self.store.program_stage(uid))
            .await
    }

    pub async fn data_element(&self, uid: &str) -> StorageResult<Option<Arc<DataElement>>> {
        self.cached(&self.data_elements, uid, self.store.data_element(uid))
            .await
    }

    pub async fn attribute(
        &self,
        uid: &str,
    ) -> StorageResult<Option<Arc<TrackedEntityAttribute>>> {
        self.cached(&self.attributes, uid, self.store.attribute(uid))
            .await
    }

    pub async fn option_set(&self, uid: &str) -> StorageResult<Option<Arc<OptionSet>>> {
        self.cached(&self.option_sets, uid, self.store.option_set(uid))
            .await
    }

    pub async fn program_indicator(
        &self,
        uid: &str,
    ) -> StorageResult<Option<Arc<ProgramIndicator>>> {
        self.cached(&self.indicators, uid, self.store.program_indicator(uid))
            .await
    }

    pub async fn tracked_entity_type(
        &self,
        uid: &str,
    ) -> StorageResult<Option<Arc<TrackedEntityType>>> {
        self.cached(
            &self.tracked_entity_types,
            uid,
            self.store.tracked_entity_type(uid),
        )
        .await
    }

    pub async fn org_unit(&self, uid: &str) -> StorageResult<Option<Arc<OrganisationUnit>>> {
        self.cached(&self.org_units, uid, self.store.org_unit(uid))
            .await
    }

    /// Direct children; not cached, but each child is.
    pub async fn org_unit_children(&self, uid: &str) -> StorageResult<Vec<Arc<OrganisationUnit>>> {
        let children = self.store.org_unit_children(uid).await?;
        Ok(children.into_iter().map(|ou| self.remember_org_unit(ou)).collect())
    }

    /// The unit itself followed by every descendant.
    pub async fn org_unit_descendants(
        &self,
        uid: &str,
    ) -> StorageResult<Vec<Arc<OrganisationUnit>>> {
        let units = self.store.org_unit_descendants(uid).await?;
        Ok(units.into_iter().map(|ou| self.remember_org_unit(ou)).collect())
    }

    fn remember_org_unit(&self, ou: OrganisationUnit) -> Arc<OrganisationUnit> {
        let ou = Arc::new(ou);
        self.org_units.insert(ou.uid.clone(), Arc::clone(&ou));
        ou
    }

    pub fn clear(&self) {
        self.programs.clear();
        self.stages.clear();
        self.data_elements.clear();
        self.attributes.clear();
        self.option_sets.clear();
        self.indicators.clear();
        self.tracked_entity_types.clear();
        self.org_units.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.programs.len()
                + self.stages.len()
                + self.data_elements.len()
                + self.attributes.len()
                + self.option_sets.len()
                + self.indicators.len()
                + self.tracked_entity_types.len()
                + self.org_units.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DimensionItemType {
    ProgramAttribute,
    ProgramDataElement,
    DataElement,
    ProgramIndicator,
    OrganisationUnit,
    Period,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DimensionType {
    OrganisationUnit,
    Period,
    ProgramAttribute,
    ProgramDataElement,
    ProgramIndicator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRef {
    pub uid: String,
    pub code: String,
}

/// One entry of `metaData.items`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension_item_type: Option<DimensionItemType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension_type: Option<DimensionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation_type: Option<AggregationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_aggregation_type: Option<AggregationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<OptionRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organisation_units: Option<Vec<String>>,
}

impl MetadataItem {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    fn object<T: NamedObject + ?Sized>(object: &T, short: bool) -> Self {
        Self {
            uid: Some(object.uid().to_string()),
            code: object.code().map(str::to_string),
            name: Some(object.display_name(short).to_string()),
            ..Self::default()
        }
    }

    pub fn attribute(attribute: &TrackedEntityAttribute, short: bool) -> Self {
        Self {
            description: attribute.description.clone(),
            dimension_item_type: Some(DimensionItemType::ProgramAttribute),
            value_type: Some(attribute.value_type),
            aggregation_type: Some(attribute.aggregation_type),
            total_aggregation_type: Some(AggregationType::Sum),
            ..Self::object(attribute, short)
        }
    }

    pub fn data_element(element: &DataElement, short: bool, in_program: bool) -> Self {
        Self {
            description: element.description.clone(),
            dimension_item_type: Some(if in_program {
                DimensionItemType::ProgramDataElement
            } else {
                DimensionItemType::DataElement
            }),
            value_type: Some(element.value_type),
            aggregation_type: Some(element.aggregation_type),
            total_aggregation_type: Some(AggregationType::Sum),
            ..Self::object(element, short)
        }
    }

    pub fn program(program: &Program, short: bool) -> Self {
        Self {
            code: None,
            ..Self::object(program, short)
        }
    }

    pub fn program_stage(stage: &ProgramStage, short: bool) -> Self {
        Self {
            code: None,
            description: Some(stage.description.clone().unwrap_or_default()),
            ..Self::object(stage, short)
        }
    }

    pub fn indicator(indicator: &ProgramIndicator, short: bool) -> Self {
        Self {
            description: indicator.description.clone(),
            dimension_item_type: Some(DimensionItemType::ProgramIndicator),
            value_type: Some(ValueType::Number),
            total_aggregation_type: Some(AggregationType::Sum),
            ..Self::object(indicator, short)
        }
    }

    pub fn option_set(option_set: &OptionSet, short: bool) -> Self {
        Self {
            code: None,
            options: Some(
                option_set
                    .options
                    .iter()
                    .map(|o| OptionRef {
                        uid: o.uid.clone(),
                        code: o.code.clone(),
                    })
                    .collect(),
            ),
            ..Self::object(option_set, short)
        }
    }

    pub fn option(option: &OptionItem) -> Self {
        Self {
            uid: Some(option.uid.clone()),
            code: Some(option.code.clone()),
            name: Some(option.name.clone()),
            ..Self::default()
        }
    }

    pub fn org_unit(ou: &OrganisationUnit, short: bool) -> Self {
        Self {
            dimension_item_type: Some(DimensionItemType::OrganisationUnit),
            value_type: Some(ValueType::Text),
            total_aggregation_type: Some(AggregationType::Sum),
            ..Self::object(ou, short)
        }
    }

    pub fn period(period: &Period) -> Self {
        let boundary = |date| AnalyticsDateTime::from_date(date).to_iso_string().ok();
        Self {
            uid: Some(period.iso.clone()),
            code: Some(period.iso.clone()),
            name: Some(period.name()),
            dimension_item_type: Some(DimensionItemType::Period),
            value_type: Some(ValueType::Text),
            total_aggregation_type: Some(AggregationType::Sum),
            start_date: boundary(period.start),
            end_date: boundary(period.end),
            ..Self::default()
        }
    }

    pub fn relative_period(keyword: RelativePeriod) -> Self {
        Self::named(keyword.display_name())
    }

    pub fn dimension(uid: &str, name: &str, dimension_type: DimensionType) -> Self {
        Self {
            uid: Some(uid.to_string()),
            name: Some(name.to_string()),
            dimension_type: Some(dimension_type),
            ..Self::default()
        }
    }

    pub fn static_column(name: &str, dimension_type: DimensionType) -> Self {
        Self {
            name: Some(name.to_string()),
            dimension_type: Some(dimension_type),
            ..Self::default()
        }
    }

    pub fn user_org_units(uids: Vec<String>) -> Self {
        Self {
            organisation_units: Some(uids),
            ..Self::default()
        }
    }

    /// `{name}` or `{code, name}`.
    fn minimal(self) -> Self {
        Self {
            code: self.code,
            name: self.name,
            ..Self::default()
        }
    }
}

/// Write-once accumulator for `metaData.items`. The first registration of a
/// key wins; later ones are ignored.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    details: bool,
    items: IndexMap<String, MetadataItem>,
}

impl MetadataRegistry {
    pub fn new(details: bool) -> Self {
        Self {
            details,
            items: IndexMap::new(),
        }
    }

    /// Registers a dimension item. Without details only `{code, name}` is kept.
    pub fn register(&mut self, key: impl Into<String>, item: MetadataItem) {
        let item = if self.details { item } else { item.minimal() };
        self.items.entry(key.into()).or_insert(item);
    }

    /// Registers an item that is only reported with `includeMetadataDetails`.
    pub fn register_detail(&mut self, key: impl Into<String>, item: MetadataItem) {
        if self.details {
            self.items.entry(key.into()).or_insert(item);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&MetadataItem> {
        self.items.get(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> IndexMap<String, MetadataItem> {
        self.items
    }
}
