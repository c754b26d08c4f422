use serde::{Deserialize, Serialize};
use tracklens_core::{NamedObject, OptionSet};

/// Identifier scheme for rendered option values and org units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdScheme {
    Uid,
    Code,
    Name,
}

impl IdScheme {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UID" | "ID" => Some(Self::Uid),
            "CODE" => Some(Self::Code),
            "NAME" => Some(Self::Name),
            _ => None,
        }
    }

    /// Identifier of a metadata object; `CODE` falls back to the UID when
    /// the object has no code.
    pub fn object_id<T: NamedObject + ?Sized>(self, object: &T) -> String {
        match self {
            Self::Uid => object.uid().to_string(),
            Self::Code => object.code().unwrap_or_else(|| object.uid()).to_string(),
            Self::Name => object.name().to_string(),
        }
    }
}

/// Renders a stored option code. Without a scheme the stored code is kept;
/// codes missing from the set pass through untouched.
pub fn translate_option(scheme: Option<IdScheme>, option_set: &OptionSet, code: &str) -> String {
    let (Some(scheme), Some(option)) = (scheme, option_set.option_by_code(code)) else {
        return code.to_string();
    };
    match scheme {
        IdScheme::Uid => option.uid.clone(),
        IdScheme::Code => option.code.clone(),
        IdScheme::Name => option.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracklens_core::{OptionItem, OrganisationUnit};

    fn gender() -> OptionSet {
        OptionSet {
            uid: "pC3N9N77UmT".into(),
            code: None,
            name: "Gender".into(),
            short_name: None,
            description: None,
            options: vec![
                OptionItem {
                    uid: "rBvjJYbMCVx".into(),
                    code: "Male".into(),
                    name: "Male (M)".into(),
                },
                OptionItem {
                    uid: "Mnp3oXrpAbK".into(),
                    code: "Female".into(),
                    name: "Female (F)".into(),
                },
            ],
        }
    }

    #[test]
    fn option_translation() {
        let set = gender();
        assert_eq!(translate_option(None, &set, "Male"), "Male");
        assert_eq!(translate_option(Some(IdScheme::Uid), &set, "Male"), "rBvjJYbMCVx");
        assert_eq!(translate_option(Some(IdScheme::Code), &set, "Female"), "Female");
        assert_eq!(translate_option(Some(IdScheme::Name), &set, "Female"), "Female (F)");
        assert_eq!(translate_option(Some(IdScheme::Name), &set, "Other"), "Other");
    }

    #[test]
    fn object_ids() {
        let ou = OrganisationUnit {
            uid: "DiszpKrYNg8".into(),
            code: None,
            name: "Ngelehun CHC".into(),
            short_name: None,
            description: None,
            parent: None,
            path: "/DiszpKrYNg8".into(),
            level: 1,
        };
        assert_eq!(IdScheme::Code.object_id(&ou), "DiszpKrYNg8");
        assert_eq!(IdScheme::Name.object_id(&ou), "Ngelehun CHC");
        assert_eq!(IdScheme::parse("name"), Some(IdScheme::Name));
        assert_eq!(IdScheme::parse("ATTRIBUTE"), None);
    }
}
