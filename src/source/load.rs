use rayon::prelude::*;

use super::{DataSource, SourceError};
use crate::feature::{normalize, Collections, Normalized, Role};

/// Collections the guide cannot work without.
const REQUIRED: [Role; 4] = [
    Role::Points,
    Role::Lines,
    Role::Polygons,
    Role::PointsOfInterest,
];

#[derive(thiserror::Error, Debug)]
#[error("failed to load {}", failed_names(.failures))]
pub struct LoadError {
    pub failures: Vec<(Role, SourceError)>,
}

fn failed_names(failures: &[(Role, SourceError)]) -> String {
    failures
        .iter()
        .map(|(role, err)| format!("{} ({})", role.collection_name(), err))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fetches and normalizes every collection.
///
/// The required collections are fetched together and joined all-or-nothing: if any of them
/// fails, no collection is returned and the error lists every failure. Subpoints are optional
/// and fall back to an empty collection.
pub fn load_collections(source: &dyn DataSource) -> Result<Collections, LoadError> {
    let fetched: Vec<(Role, Result<Normalized, SourceError>)> = REQUIRED
        .par_iter()
        .map(|role| {
            let normalized = source
                .fetch_collection(role.collection_name())
                .map(|records| normalize(*role, records));
            (*role, normalized)
        })
        .collect();

    let mut collections = Collections::default();
    let mut failures = Vec::new();
    for (role, normalized) in fetched {
        match normalized {
            Ok(normalized) => {
                log::info!(
                    "Loaded {} {} features, skipped {}",
                    normalized.collection.len(),
                    role.collection_name(),
                    normalized.skipped_count()
                );
                collections.set(normalized.collection);
            }
            Err(err) => {
                log::error!("Error loading {}: {}", role.collection_name(), err);
                failures.push((role, err));
            }
        }
    }
    if !failures.is_empty() {
        return Err(LoadError { failures });
    }

    match source.fetch_collection(Role::Subpoints.collection_name()) {
        Ok(records) => {
            let normalized = normalize(Role::Subpoints, records);
            log::info!(
                "Loaded {} subpoints, skipped {}",
                normalized.collection.len(),
                normalized.skipped_count()
            );
            collections.set(normalized.collection);
        }
        Err(err) => log::warn!("No subpoints available: {}", err),
    }

    Ok(collections)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;

    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::feature::RawRecord;

    /// Source serving fixed records; collections not listed are missing.
    struct FixedSource(BTreeMap<&'static str, Vec<RawRecord>>);

    impl DataSource for FixedSource {
        fn fetch_collection(&self, collection: &str) -> Result<Vec<RawRecord>, SourceError> {
            self.0
                .get(collection)
                .cloned()
                .ok_or_else(|| SourceError::NotFound(collection.to_string()))
        }
    }

    fn record(id: &str, name: &str) -> RawRecord {
        let fields = json!({
            "name_en": name,
            "longitude": -122.6,
            "latitude": 45.6,
        });
        match fields {
            serde_json::Value::Object(fields) => RawRecord::new(id, fields),
            _ => unreachable!(),
        }
    }

    fn source(collections: &[&'static str]) -> FixedSource {
        FixedSource(
            collections
                .iter()
                .map(|name| (*name, vec![record(&format!("{}_1", name), name)]))
                .collect(),
        )
    }

    #[rstest]
    fn test_all_collections_loaded() {
        let collections =
            load_collections(&source(&["points", "lines", "polygons", "poi", "subpoints"]))
                .unwrap();
        for role in Role::ALL {
            assert_eq!(collections.get(role).len(), 1);
        }
        assert_eq!(collections.points_of_interest.features[0].id, "poi_1");
    }

    #[rstest]
    fn test_missing_subpoints_degrade_to_empty() {
        let collections = load_collections(&source(&["points", "lines", "polygons", "poi"])).unwrap();
        assert!(collections.subpoints.is_empty());
        assert_eq!(collections.points_of_interest.len(), 1);
    }

    #[rstest]
    #[case(&["lines", "polygons", "poi"], vec![Role::Points])]
    #[case(&["points", "polygons"], vec![Role::Lines, Role::PointsOfInterest])]
    #[case(&[], vec![Role::Points, Role::Lines, Role::Polygons, Role::PointsOfInterest])]
    fn test_required_failure_is_all_or_nothing(
        #[case] available: &[&'static str],
        #[case] expected: Vec<Role>,
    ) {
        let err = load_collections(&source(available)).unwrap_err();
        let failed: Vec<Role> = err.failures.iter().map(|(role, _)| *role).collect();
        assert_eq!(failed, expected);
        assert!(err.to_string().starts_with("failed to load"));
    }

    /// Source whose fetches of required collections each wait until all of them are in
    /// flight, so a one-at-a-time load never sees them overlap.
    struct GatedSource {
        in_flight: Mutex<usize>,
        started: Condvar,
        overlapped: AtomicUsize,
    }

    impl DataSource for GatedSource {
        fn fetch_collection(&self, collection: &str) -> Result<Vec<RawRecord>, SourceError> {
            if collection == Role::Subpoints.collection_name() {
                return Ok(Vec::new());
            }
            let mut in_flight = self.in_flight.lock().unwrap();
            *in_flight += 1;
            self.started.notify_all();
            let (in_flight, _) = self
                .started
                .wait_timeout_while(in_flight, Duration::from_secs(2), |count| {
                    *count < REQUIRED.len()
                })
                .unwrap();
            if *in_flight == REQUIRED.len() {
                self.overlapped.fetch_add(1, Ordering::SeqCst);
            }
            Ok(vec![record(&format!("{}_1", collection), collection)])
        }
    }

    #[rstest]
    fn test_required_collections_are_fetched_together() {
        let source = GatedSource {
            in_flight: Mutex::new(0),
            started: Condvar::new(),
            overlapped: AtomicUsize::new(0),
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(REQUIRED.len())
            .build()
            .unwrap();
        let collections = pool.install(|| load_collections(&source)).unwrap();
        assert_eq!(source.overlapped.load(Ordering::SeqCst), REQUIRED.len());
        assert_eq!(collections.points_of_interest.len(), 1);
        assert!(collections.subpoints.is_empty());
    }
}
