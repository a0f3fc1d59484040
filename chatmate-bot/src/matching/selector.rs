use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use chatmate_shared::AppResult;

use super::algorithm::{calculate_score, ScoreBreakdown};
use crate::models::{CandidateFilter, User};
use crate::store::ProfileStore;

/// The winning candidate of a match request.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub user: User,
    pub shared_interests: u32,
    pub score: ScoreBreakdown,
}

/// Two-phase selection: bounded filtered fetch from the store, then
/// in-process scoring over the shuffled pool.
pub struct Matcher {
    profiles: Arc<dyn ProfileStore>,
    max_pool: usize,
}

impl Matcher {
    pub fn new(profiles: Arc<dyn ProfileStore>, max_pool: usize) -> Self {
        Self {
            profiles,
            max_pool: max_pool.max(1),
        }
    }

    /// Hard filters for `requester`, or `None` if they cannot be matched at all.
    fn filter_for(&self, requester: &User) -> Option<CandidateFilter> {
        if !requester.is_active || requester.is_in_chat {
            return None;
        }
        Some(CandidateFilter {
            requester_id: requester.user_id,
            requester_gender: requester.gender?,
            requester_looking_for: requester.looking_for?,
            min_age: requester.min_age,
            max_age: requester.max_age,
            city: requester
                .has_city()
                .then(|| requester.city.clone())
                .flatten(),
            limit: self.max_pool,
        })
    }

    pub fn select_match(&self, requester_id: i64) -> AppResult<Option<MatchCandidate>> {
        self.select_match_with_rng(requester_id, &mut rand::thread_rng())
    }

    pub fn select_match_with_rng<R: Rng + ?Sized>(
        &self,
        requester_id: i64,
        rng: &mut R,
    ) -> AppResult<Option<MatchCandidate>> {
        let Some(requester) = self.profiles.get_user(requester_id)? else {
            tracing::debug!(user_id = requester_id, "match requested by unknown user");
            return Ok(None);
        };
        let Some(filter) = self.filter_for(&requester) else {
            tracing::debug!(user_id = requester_id, "requester is not eligible for matching");
            return Ok(None);
        };

        let mut pool = self.profiles.find_candidates(&filter)?;
        pool.truncate(self.max_pool);
        pool.shuffle(rng);

        let mut best: Option<MatchCandidate> = None;
        for candidate in pool {
            // The store's view may be stale by the time we score.
            if !filter.admits(&candidate.user) {
                continue;
            }
            let score = calculate_score(&requester, &candidate.user, candidate.shared_interests);
            let better = best
                .as_ref()
                .map_or(true, |b| score.total() > b.score.total());
            if better {
                best = Some(MatchCandidate {
                    user: candidate.user,
                    shared_interests: candidate.shared_interests,
                    score,
                });
            }
        }

        match &best {
            Some(found) => {
                metrics::counter!("matches_selected_total").increment(1);
                tracing::info!(
                    user_id = requester_id,
                    partner_id = found.user.user_id,
                    score = found.score.total(),
                    shared_interests = found.shared_interests,
                    "match selected"
                );
            }
            None => {
                metrics::counter!("match_pool_empty_total").increment(1);
                tracing::debug!(user_id = requester_id, "candidate pool empty");
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::models::{Gender, LookingFor, UserPatch, DEFAULT_INTERESTS};
    use crate::store::{MemoryStore, SessionStore};

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.seed_interests(&DEFAULT_INTERESTS).unwrap();
        store
    }

    fn add(store: &MemoryStore, id: i64, age: i32, gender: Gender, looking_for: LookingFor, city: &str) {
        store
            .upsert_user(
                id,
                &UserPatch {
                    age: Some(age),
                    gender: Some(gender),
                    looking_for: Some(looking_for),
                    city: Some(city.into()),
                    bio: Some("Here for good conversation".into()),
                    ..UserPatch::default()
                },
            )
            .unwrap();
    }

    fn give(store: &MemoryStore, id: i64, names: &[&str]) {
        let catalogue = store.list_interests().unwrap();
        for name in names {
            let interest = catalogue.iter().find(|i| i.name == *name).unwrap();
            store.add_user_interest(id, interest.id).unwrap();
        }
    }

    #[test]
    fn paris_scenario_matches_and_scores() {
        let store = store();
        add(&store, 1, 25, Gender::Male, LookingFor::Female, "Paris");
        add(&store, 2, 27, Gender::Female, LookingFor::Male, "Paris");
        give(&store, 1, &["Music", "Art"]);
        give(&store, 2, &["Music", "Travel"]);

        let matcher = Matcher::new(store.clone(), 10);
        let found = matcher.select_match(1).unwrap().unwrap();
        assert_eq!(found.user.user_id, 2);
        assert_eq!(found.shared_interests, 1);
        assert_eq!(found.score.total(), 10 + 18 + 15 + 25 + 5 + 5);

        let session = store.create_session(1, found.user.user_id).unwrap();
        assert!(session.involves(1) && session.involves(2));
    }

    #[test]
    fn never_returns_self_busy_or_out_of_range() {
        let store = store();
        add(&store, 1, 30, Gender::Male, LookingFor::Anyone, "Berlin");
        store
            .upsert_user(1, &UserPatch { min_age: Some(25), max_age: Some(35), ..UserPatch::default() })
            .unwrap();
        add(&store, 2, 40, Gender::Female, LookingFor::Anyone, "Berlin");
        add(&store, 3, 30, Gender::Female, LookingFor::Anyone, "Berlin");
        add(&store, 4, 30, Gender::Female, LookingFor::Anyone, "Berlin");
        add(&store, 5, 31, Gender::Male, LookingFor::Anyone, "Berlin");
        store.create_session(3, 4).unwrap();

        let matcher = Matcher::new(store.clone(), 10);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let found = matcher.select_match_with_rng(1, &mut rng).unwrap().unwrap();
            assert_eq!(found.user.user_id, 5);
            assert!(!found.user.is_in_chat);
        }
    }

    #[test]
    fn empty_pool_is_none() {
        let store = store();
        add(&store, 1, 30, Gender::Male, LookingFor::Female, "Rome");
        add(&store, 2, 30, Gender::Male, LookingFor::Female, "Rome");

        let matcher = Matcher::new(store, 10);
        assert!(matcher.select_match(1).unwrap().is_none());
    }

    #[test]
    fn ineligible_requester_is_none() {
        let store = store();
        add(&store, 1, 30, Gender::Male, LookingFor::Anyone, "Rome");
        add(&store, 2, 30, Gender::Female, LookingFor::Anyone, "Rome");
        add(&store, 3, 30, Gender::Female, LookingFor::Anyone, "Rome");
        store.upsert_user(9, &UserPatch::default()).unwrap();

        let matcher = Matcher::new(store.clone(), 10);
        assert!(matcher.select_match(42).unwrap().is_none());
        assert!(matcher.select_match(9).unwrap().is_none());

        store.create_session(1, 2).unwrap();
        assert!(matcher.select_match(1).unwrap().is_none());

        store
            .upsert_user(3, &UserPatch { is_active: Some(false), ..UserPatch::default() })
            .unwrap();
        assert!(matcher.select_match(3).unwrap().is_none());
    }

    #[test]
    fn higher_shared_interest_wins() {
        let store = store();
        add(&store, 1, 30, Gender::Male, LookingFor::Anyone, "Oslo");
        add(&store, 2, 30, Gender::Female, LookingFor::Anyone, "Oslo");
        add(&store, 3, 30, Gender::Female, LookingFor::Anyone, "Oslo");
        give(&store, 1, &["Music", "Books", "Travel"]);
        give(&store, 2, &["Music"]);
        give(&store, 3, &["Music", "Books"]);

        let matcher = Matcher::new(store, 10);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10 {
            let found = matcher.select_match_with_rng(1, &mut rng).unwrap().unwrap();
            assert_eq!(found.user.user_id, 3);
        }
    }

    #[test]
    fn ties_are_broken_by_the_shuffle() {
        let store = store();
        add(&store, 1, 30, Gender::Male, LookingFor::Anyone, "Oslo");
        for id in 2..=5 {
            add(&store, id, 30, Gender::Female, LookingFor::Anyone, "Oslo");
        }

        let matcher = Matcher::new(store, 10);
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            seen.insert(matcher.select_match_with_rng(1, &mut rng).unwrap().unwrap().user.user_id);
        }
        assert!(seen.len() > 1);
    }
}
