use std::collections::HashSet;

use async_trait::async_trait;
use tracklens_core::{
    DataElement, OptionSet, OrganisationUnit, Program, ProgramIndicator, ProgramStage,
    TrackedEntityAttribute, TrackedEntityType,
};
use tracklens_storage::{
    Enrollment, EnrollmentQuery, EntityQuery, Event, EventQuery, MetadataStore, StorageError,
    TrackedEntity, TrackerStore, UserAccount, UserStore,
};

use crate::storage::InMemoryStore;

#[async_trait]
impl TrackerStore for InMemoryStore {
    async fn tracked_entities(
        &self,
        query: &EntityQuery,
    ) -> Result<Vec<TrackedEntity>, StorageError> {
        let guard = self.entities.pin();
        let mut matched: Vec<TrackedEntity> = guard
            .iter()
            .filter(|(_, entity)| query.matches(entity))
            .map(|(_, entity)| entity.clone())
            .collect();
        matched.sort_by(|a, b| a.uid.cmp(&b.uid));
        tracing::debug!(
            tracked_entity_type = %query.tracked_entity_type,
            matched = matched.len(),
            "scanned tracked entities"
        );
        Ok(matched)
    }

    async fn enrollments(&self, query: &EnrollmentQuery) -> Result<Vec<Enrollment>, StorageError> {
        let wanted: HashSet<&str> = query.tracked_entities.iter().map(String::as_str).collect();
        let guard = self.enrollments.pin();
        let mut matched: Vec<Enrollment> = guard
            .iter()
            .filter(|(_, e)| e.program == query.program && wanted.contains(e.tracked_entity.as_str()))
            .map(|(_, e)| e.clone())
            .collect();
        matched.sort_by(|a, b| {
            a.enrollment_date
                .cmp(&b.enrollment_date)
                .then_with(|| a.uid.cmp(&b.uid))
        });
        Ok(matched)
    }

    async fn events(&self, query: &EventQuery) -> Result<Vec<Event>, StorageError> {
        let wanted: HashSet<&str> = query.enrollments.iter().map(String::as_str).collect();
        let guard = self.events.pin();
        let mut matched: Vec<Event> = guard
            .iter()
            .filter(|(_, e)| {
                e.program_stage == query.program_stage && wanted.contains(e.enrollment.as_str())
            })
            .map(|(_, e)| e.clone())
            .collect();
        matched.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(matched)
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn program(&self, uid: &str) -> Result<Option<Program>, StorageError> {
        Ok(self.programs.pin().get(uid).cloned())
    }

    async fn program_stage(&self, uid: &str) -> Result<Option<ProgramStage>, StorageError> {
        Ok(self.program_stages.pin().get(uid).cloned())
    }

    async fn data_element(&self, uid: &str) -> Result<Option<DataElement>, StorageError> {
        Ok(self.data_elements.pin().get(uid).cloned())
    }

    async fn attribute(&self, uid: &str) -> Result<Option<TrackedEntityAttribute>, StorageError> {
        Ok(self.attributes.pin().get(uid).cloned())
    }

    async fn option_set(&self, uid: &str) -> Result<Option<OptionSet>, StorageError> {
        Ok(self.option_sets.pin().get(uid).cloned())
    }

    async fn program_indicator(
        &self,
        uid: &str,
    ) -> Result<Option<ProgramIndicator>, StorageError> {
        Ok(self.program_indicators.pin().get(uid).cloned())
    }

    async fn tracked_entity_type(
        &self,
        uid: &str,
    ) -> Result<Option<TrackedEntityType>, StorageError> {
        Ok(self.tracked_entity_types.pin().get(uid).cloned())
    }

    async fn org_unit(&self, uid: &str) -> Result<Option<OrganisationUnit>, StorageError> {
        Ok(self.org_units.pin().get(uid).cloned())
    }

    async fn org_unit_children(&self, uid: &str) -> Result<Vec<OrganisationUnit>, StorageError> {
        let guard = self.org_units.pin();
        if guard.get(uid).is_none() {
            return Err(StorageError::not_found("OrganisationUnit", uid));
        }
        let mut children: Vec<OrganisationUnit> = guard
            .iter()
            .filter(|(_, ou)| ou.parent.as_deref() == Some(uid))
            .map(|(_, ou)| ou.clone())
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn org_unit_descendants(
        &self,
        uid: &str,
    ) -> Result<Vec<OrganisationUnit>, StorageError> {
        let guard = self.org_units.pin();
        let Some(root) = guard.get(uid).cloned() else {
            return Err(StorageError::not_found("OrganisationUnit", uid));
        };
        let mut below: Vec<OrganisationUnit> = guard
            .iter()
            .filter(|(key, ou)| key.as_str() != uid && ou.is_within(uid))
            .map(|(_, ou)| ou.clone())
            .collect();
        below.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));
        let mut all = Vec::with_capacity(below.len() + 1);
        all.push(root);
        all.extend(below);
        Ok(all)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn user(&self, username: &str) -> Result<Option<UserAccount>, StorageError> {
        Ok(self.users.pin().get(username).cloned())
    }
}
