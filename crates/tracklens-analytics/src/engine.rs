//! Query execution: plan, fetch, project, sort, page, assemble.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::{debug, instrument, warn};
use tracklens_core::OrganisationUnit;
use tracklens_storage::{
    DynTrackerStore, DynUserStore, Enrollment, EnrollmentQuery, Event, EventQuery, MetadataStore,
    TrackedEntity, TrackerStore, UserAccount, UserStore,
};

use crate::config::AnalyticsConfig;
use crate::error::QueryError;
use crate::grid::Grid;
use crate::instances::{EnrollmentArena, EventArena};
use crate::metadata::{CacheStats, MetadataCache};
use crate::params::QueryParams;
use crate::planner::{QueryPlan, QueryPlanner};
use crate::project::{Projector, event_matches};
use crate::sort::sort_rows;

/// Executes tracked entity queries against a tracker store.
///
/// Metadata lookups go through a shared [`MetadataCache`]; tracker data is
/// read fresh on every request.
#[derive(Clone)]
pub struct AnalyticsEngine {
    tracker: DynTrackerStore,
    users: DynUserStore,
    metadata: Arc<MetadataCache>,
    config: AnalyticsConfig,
}

impl AnalyticsEngine {
    pub fn new(
        tracker: DynTrackerStore,
        metadata: Arc<MetadataCache>,
        users: DynUserStore,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            tracker,
            users,
            metadata,
            config,
        }
    }

    /// Builds an engine over a single backend that serves every store trait.
    pub fn from_store<S>(store: Arc<S>, config: AnalyticsConfig) -> Self
    where
        S: TrackerStore + MetadataStore + UserStore + 'static,
    {
        let metadata = Arc::new(MetadataCache::new(store.clone()));
        Self::new(store.clone(), metadata, store, config)
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.metadata.stats()
    }

    /// Drops every cached metadata object.
    pub fn clear_cache(&self) {
        self.metadata.clear();
    }

    /// Parses `query` and runs it.
    ///
    /// # Errors
    ///
    /// See [`AnalyticsEngine::query`].
    pub async fn query_str(
        &self,
        tracked_entity_type: &str,
        query: &str,
        username: Option<&str>,
    ) -> Result<Grid, QueryError> {
        let params = QueryParams::parse_query(query)?;
        self.query(tracked_entity_type, &params, username).await
    }

    /// Runs one query for `tracked_entity_type`.
    ///
    /// `username` is only consulted for the `USER_ORGUNIT` family of org unit
    /// items; an unknown user behaves like an anonymous request.
    ///
    /// # Errors
    ///
    /// Client errors from planning (`InvalidDimension`, `MissingAnchorDate`,
    /// `UnknownDimension`, `InvalidParameter`, `NotFound`) and `Storage` for
    /// backend failures.
    #[instrument(skip(self, params), fields(tet = %tracked_entity_type))]
    pub async fn query(
        &self,
        tracked_entity_type: &str,
        params: &QueryParams,
        username: Option<&str>,
    ) -> Result<Grid, QueryError> {
        let user = self.user(username).await?;
        let plan = QueryPlanner::new(&self.metadata, &self.config)
            .plan(tracked_entity_type, params, user.as_ref())
            .await?;

        let entities = self.tracker.tracked_entities(&plan.entity_query).await?;
        debug!(count = entities.len(), "tracked entities fetched");

        let enrollments = self.fetch_enrollments(&plan, &entities).await?;
        let events = self.fetch_events(&plan, &enrollments).await?;
        let enrollments = EnrollmentArena::from_enrollments(enrollments);
        let events = EventArena::from_events(events);
        debug!(
            enrollments = enrollments.len(),
            events = events.len(),
            "instances fetched"
        );

        let org_units = self.org_units(&entities, &enrollments, &events).await?;
        let projector = Projector {
            plan: &plan,
            enrollments: &enrollments,
            events: &events,
            org_units: &org_units,
        };
        let mut rows: Vec<_> = entities.iter().filter_map(|e| projector.project(e)).collect();
        debug!(matched = rows.len(), "rows projected");

        sort_rows(&mut rows, &plan.sort);
        let (rows, pager) = plan.paging.apply(rows);
        Ok(Grid::assemble(plan, rows, pager))
    }

    async fn user(&self, username: Option<&str>) -> Result<Option<UserAccount>, QueryError> {
        let Some(username) = username else {
            return Ok(None);
        };
        let user = self.users.user(username).await?;
        if user.is_none() {
            warn!(username, "unknown user, treating request as anonymous");
        }
        Ok(user)
    }

    async fn fetch_enrollments(
        &self,
        plan: &QueryPlan,
        entities: &[TrackedEntity],
    ) -> Result<Vec<Enrollment>, QueryError> {
        if plan.enrollment_programs.is_empty() || entities.is_empty() {
            return Ok(Vec::new());
        }
        let uids: Vec<String> = entities.iter().map(|e| e.uid.clone()).collect();
        let queries: Vec<EnrollmentQuery> = plan
            .enrollment_programs
            .iter()
            .map(|program| EnrollmentQuery {
                program: program.clone(),
                tracked_entities: uids.clone(),
            })
            .collect();
        let batches = try_join_all(queries.iter().map(|q| self.tracker.enrollments(q))).await?;
        Ok(batches.into_iter().flatten().collect())
    }

    async fn fetch_events(
        &self,
        plan: &QueryPlan,
        enrollments: &[Enrollment],
    ) -> Result<Vec<Event>, QueryError> {
        if plan.stages.is_empty() || enrollments.is_empty() {
            return Ok(Vec::new());
        }
        let queries: Vec<(usize, EventQuery)> = plan
            .stages
            .iter()
            .enumerate()
            .map(|(index, stage)| {
                let enrollments = enrollments
                    .iter()
                    .filter(|e| e.program == stage.program)
                    .map(|e| e.uid.clone())
                    .collect();
                (
                    index,
                    EventQuery {
                        program_stage: stage.uid.clone(),
                        enrollments,
                    },
                )
            })
            .filter(|(_, q)| !q.enrollments.is_empty())
            .collect();
        let batches = try_join_all(queries.iter().map(|(index, query)| async move {
            let events = self.tracker.events(query).await?;
            Ok::<_, QueryError>((*index, events))
        }))
        .await?;

        let mut matched = Vec::new();
        for (index, events) in batches {
            let stage = &plan.stages[index];
            matched.extend(
                events
                    .into_iter()
                    .filter(|event| event_matches(&plan.event_filters, stage, event)),
            );
        }
        Ok(matched)
    }

    /// Loads every org unit a row may render, including ancestors for the
    /// name hierarchy column.
    async fn org_units(
        &self,
        entities: &[TrackedEntity],
        enrollments: &EnrollmentArena,
        events: &EventArena,
    ) -> Result<HashMap<String, Arc<OrganisationUnit>>, QueryError> {
        let mut pending: Vec<String> = entities
            .iter()
            .map(|e| e.org_unit.clone())
            .chain(enrollments.iter().map(|e| e.org_unit.clone()))
            .chain(events.iter().map(|e| e.org_unit.clone()))
            .collect();
        pending.sort();
        pending.dedup();

        let mut loaded: HashMap<String, Arc<OrganisationUnit>> = HashMap::new();
        while let Some(uid) = pending.pop() {
            if loaded.contains_key(&uid) {
                continue;
            }
            let Some(ou) = self.metadata.org_unit(&uid).await? else {
                continue;
            };
            pending.extend(
                ou.ancestry()
                    .filter(|a| !loaded.contains_key(*a))
                    .map(str::to_string),
            );
            loaded.insert(uid, ou);
        }
        Ok(loaded)
    }
}

impl std::fmt::Debug for AnalyticsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsEngine")
            .field("config", &self.config)
            .field("cache", &self.metadata.stats())
            .finish_non_exhaustive()
    }
}
