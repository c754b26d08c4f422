//! Org-unit dimension expansion.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracklens_core::OrganisationUnit;
use tracklens_storage::UserAccount;

use crate::error::QueryError;
use crate::metadata::MetadataCache;

pub const USER_ORGUNIT: &str = "USER_ORGUNIT";
pub const USER_ORGUNIT_CHILDREN: &str = "USER_ORGUNIT_CHILDREN";
pub const USER_ORGUNIT_GRANDCHILDREN: &str = "USER_ORGUNIT_GRANDCHILDREN";
const LEVEL_PREFIX: &str = "LEVEL-";
const GROUP_PREFIX: &str = "OU_GROUP-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum OuMode {
    Selected,
    Children,
    #[default]
    Descendants,
}

impl OuMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SELECTED" => Some(Self::Selected),
            "CHILDREN" => Some(Self::Children),
            "DESCENDANTS" => Some(Self::Descendants),
            _ => None,
        }
    }
}

/// Result of expanding one org-unit dimension.
#[derive(Debug, Clone, Default)]
pub struct OrgUnitSelection {
    /// Units reported in `metaData.dimensions`, in request order.
    pub selected: Vec<Arc<OrganisationUnit>>,
    /// The requesting user's units when `USER_ORGUNIT` was used.
    pub user_org_units: Option<Vec<String>>,
    /// Every unit a row's org unit may be in.
    pub effective: HashSet<String>,
}

impl OrgUnitSelection {
    pub fn selected_uids(&self) -> Vec<String> {
        self.selected.iter().map(|ou| ou.uid.clone()).collect()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.effective.contains(uid)
    }
}

fn push_unique(target: &mut Vec<Arc<OrganisationUnit>>, ou: Arc<OrganisationUnit>) {
    if !target.iter().any(|existing| existing.uid == ou.uid) {
        target.push(ou);
    }
}

pub struct OrgUnitResolver<'a> {
    cache: &'a MetadataCache,
}

impl<'a> OrgUnitResolver<'a> {
    pub fn new(cache: &'a MetadataCache) -> Self {
        Self { cache }
    }

    /// Expands `items` (UIDs, `USER_ORGUNIT*` keywords and `LEVEL-n`) under `mode`.
    ///
    /// `LEVEL-n` items replace the mode: the result is every descendant of
    /// the other items at one of the requested levels.
    ///
    /// # Errors
    ///
    /// `InvalidDimension` naming `token` for unknown UIDs, unsupported items,
    /// or a user keyword without a requesting user.
    pub async fn resolve(
        &self,
        token: &str,
        items: &[String],
        mode: OuMode,
        user: Option<&UserAccount>,
    ) -> Result<OrgUnitSelection, QueryError> {
        let mut boundaries: Vec<Arc<OrganisationUnit>> = Vec::new();
        let mut levels: Vec<u32> = Vec::new();
        let mut user_org_units = None;

        for item in items {
            match item.as_str() {
                USER_ORGUNIT | USER_ORGUNIT_CHILDREN | USER_ORGUNIT_GRANDCHILDREN => {
                    let user = user.ok_or_else(|| {
                        QueryError::invalid_dimension(token, format!("{item} requires a user"))
                    })?;
                    let assigned = self.load_all(token, &user.org_units).await?;
                    let expanded = match item.as_str() {
                        USER_ORGUNIT => assigned,
                        USER_ORGUNIT_CHILDREN => self.children_of(&assigned).await?,
                        _ => {
                            let children = self.children_of(&assigned).await?;
                            self.children_of(&children).await?
                        }
                    };
                    if item == USER_ORGUNIT {
                        user_org_units = Some(user.org_units.clone());
                    }
                    for ou in expanded {
                        push_unique(&mut boundaries, ou);
                    }
                }
                level if level.starts_with(LEVEL_PREFIX) => {
                    let level = level[LEVEL_PREFIX.len()..].parse::<u32>().map_err(|_| {
                        QueryError::invalid_dimension(token, format!("malformed level `{item}`"))
                    })?;
                    levels.push(level);
                }
                group if group.starts_with(GROUP_PREFIX) => {
                    return Err(QueryError::invalid_dimension(
                        token,
                        "org unit groups are not supported",
                    ));
                }
                uid => {
                    let ou = self.load(token, uid).await?;
                    push_unique(&mut boundaries, ou);
                }
            }
        }

        if boundaries.is_empty() {
            return Err(QueryError::invalid_dimension(
                token,
                "no organisation unit selected",
            ));
        }

        let mut selection = OrgUnitSelection {
            user_org_units,
            ..Default::default()
        };

        if !levels.is_empty() {
            for boundary in &boundaries {
                for ou in self.cache.org_unit_descendants(&boundary.uid).await? {
                    if levels.contains(&ou.level) {
                        selection.effective.insert(ou.uid.clone());
                        push_unique(&mut selection.selected, ou);
                    }
                }
            }
            return Ok(selection);
        }

        for boundary in &boundaries {
            selection.effective.insert(boundary.uid.clone());
            match mode {
                OuMode::Selected => {}
                OuMode::Children => {
                    for child in self.cache.org_unit_children(&boundary.uid).await? {
                        selection.effective.insert(child.uid.clone());
                    }
                }
                OuMode::Descendants => {
                    for ou in self.cache.org_unit_descendants(&boundary.uid).await? {
                        selection.effective.insert(ou.uid.clone());
                    }
                }
            }
        }
        selection.selected = boundaries;
        Ok(selection)
    }

    async fn load(&self, token: &str, uid: &str) -> Result<Arc<OrganisationUnit>, QueryError> {
        self.cache.org_unit(uid).await?.ok_or_else(|| {
            QueryError::invalid_dimension(token, format!("unknown organisation unit `{uid}`"))
        })
    }

    async fn load_all(
        &self,
        token: &str,
        uids: &[String],
    ) -> Result<Vec<Arc<OrganisationUnit>>, QueryError> {
        let mut units = Vec::with_capacity(uids.len());
        for uid in uids {
            units.push(self.load(token, uid).await?);
        }
        Ok(units)
    }

    async fn children_of(
        &self,
        parents: &[Arc<OrganisationUnit>],
    ) -> Result<Vec<Arc<OrganisationUnit>>, QueryError> {
        let mut children = Vec::new();
        for parent in parents {
            children.extend(self.cache.org_unit_children(&parent.uid).await?);
        }
        Ok(children)
    }
}
