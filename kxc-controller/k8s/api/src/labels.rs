use std::collections::BTreeMap;

/// The `app` label. Tenant namespaces carry the platform name; App-derived
/// objects carry the App name.
pub const APP: &str = "app";

/// Names the Project that a namespace or App-derived object belongs to.
pub const PROJECT: &str = "project";

/// Names the UserAccount that owns a Project.
pub const USER_ACCOUNT: &str = "user_account";

/// The value of the `app` label on platform-level objects.
pub const PLATFORM: &str = "kxc";

/// Pod template annotation (and App annotation) holding the restart marker.
pub const RESTARTED_AT_ANNOTATION: &str = "cloud.kubexcloud.com/restartedAt";

pub type Map = BTreeMap<String, String>;

/// Labels carried by the namespace of a Project.
pub fn for_namespace(project: &str) -> Map {
    from_pairs([(APP, PLATFORM), (PROJECT, project)])
}

/// Labels carried by a Project owned by `user`.
pub fn for_project(user: &str) -> Map {
    from_pairs([(APP, PLATFORM), (USER_ACCOUNT, user)])
}

/// Labels carried by an App and every object derived from it. These also
/// serve as the workload's pod selector.
pub fn for_app(project: &str, app: &str) -> Map {
    from_pairs([(APP, app), (PROJECT, project)])
}

/// Returns true if every label in `selector` is set to the same value.
/// Unlabeled objects only match the empty selector.
pub fn matches(labels: Option<&Map>, selector: &Map) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
}

/// Renders an equality-based label selector, e.g. `app=kxc,project=acme`.
pub fn selector(labels: &Map) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Map {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn selector_matching() {
        let web = for_app("acme", "web");
        let project = btreemap! { PROJECT.to_string() => "acme".to_string() };
        let other = btreemap! { PROJECT.to_string() => "other".to_string() };

        assert!(matches(None, &Map::new()), "empty selector matches anything");
        assert!(matches(Some(&web), &web), "exact match");
        assert!(matches(Some(&web), &project), "subset match");
        assert!(!matches(Some(&web), &other), "value mismatch");
        assert!(!matches(None, &project), "unlabeled object");
        assert!(
            !matches(Some(&project), &web),
            "selector label missing from object"
        );
    }

    #[test]
    fn label_conventions() {
        assert_eq!(
            for_namespace("acme"),
            btreemap! {
                "app".to_string() => "kxc".to_string(),
                "project".to_string() => "acme".to_string(),
            }
        );
        assert_eq!(
            for_app("acme", "web"),
            btreemap! {
                "app".to_string() => "web".to_string(),
                "project".to_string() => "acme".to_string(),
            }
        );
        assert_eq!(selector(&for_app("acme", "web")), "app=web,project=acme");
    }
}
