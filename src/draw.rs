use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::{bet::Bet, store::BetStore};

/// Where an agency stands regarding the draw
#[derive(Debug, Clone, PartialEq)]
enum AgencyStatus {
    /// asked for the results before the draw took place
    Waiting,

    /// the draw took place, holds the documents of its winning bets
    Resolved(Vec<String>),
}

/// What an agency gets back when it asks for the results
///
/// the query that completes the set of waiting agencies already gets its `Winners`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Pending,
    Winners(Vec<String>),
}

#[derive(Debug, Default)]
struct DrawState {
    revealed: bool,
    agencies: HashMap<u32, AgencyStatus>,
}

/// Holds back the results until every agency has asked for them
///
/// the draw is computed at most once, as soon as the number of distinct
/// waiting agencies reaches the configured amount. from then on every
/// agency is handed its own winners exactly once.
pub struct DrawBarrier {
    agencies: usize,
    store: Arc<dyn BetStore>,
    state: Mutex<DrawState>,
}

impl DrawBarrier {
    pub fn new(agencies: usize, store: Arc<dyn BetStore>) -> Self {
        Self {
            agencies,
            store,
            state: Mutex::default(),
        }
    }

    /// Registers the agency as waiting, or hands it its winners once the draw took place
    ///
    /// the query that completes the set of waiting agencies triggers the draw,
    /// and is answered with its results right away.
    /// an agency that was already served, or that never took part, has no winners.
    pub async fn query(&self, agency: u32) -> Outcome {
        let mut state = self.state.lock().await;

        if !state.revealed {
            state.agencies.entry(agency).or_insert(AgencyStatus::Waiting);
            tracing::info!(
                "agency {} is waiting for the draw ({}/{})",
                agency,
                state.agencies.len(),
                self.agencies
            );

            self.try_draw(&mut state).await;
            if !state.revealed {
                return Outcome::Pending;
            }
        }

        match state.agencies.remove(&agency) {
            Some(AgencyStatus::Resolved(winners)) => {
                tracing::info!("handing {} winners to agency {}", winners.len(), agency);
                Outcome::Winners(winners)
            }
            _ => {
                tracing::debug!("agency {} has nothing left to collect", agency);
                Outcome::Winners(vec![])
            }
        }
    }

    /// Runs the draw if every agency is waiting and it didn't run yet
    ///
    /// returns whether the draw has taken place.
    pub async fn maybe_draw(&self) -> bool {
        let mut state = self.state.lock().await;
        self.try_draw(&mut state).await;
        state.revealed
    }

    #[cfg(test)]
    pub async fn is_revealed(&self) -> bool {
        self.state.lock().await.revealed
    }

    // must be called while holding the state lock
    async fn try_draw(&self, state: &mut DrawState) {
        if state.revealed || state.agencies.len() != self.agencies {
            return;
        }

        let bets = match self.store.load_bets().await {
            Ok(bets) => bets,
            Err(reason) => {
                // leave the draw pending, the next attempt will retry
                tracing::error!("failed to load the bets for the draw: {}", reason);
                return;
            }
        };

        let mut winners: HashMap<u32, Vec<String>> = HashMap::new();
        for bet in bets.into_iter().filter(Bet::has_won) {
            winners.entry(bet.agency).or_default().push(bet.document);
        }

        // waiting agencies without winners still get an (empty) answer
        for agency in state.agencies.keys() {
            winners.entry(*agency).or_default();
        }

        state.agencies = winners
            .into_iter()
            .map(|(agency, documents)| (agency, AgencyStatus::Resolved(documents)))
            .collect();
        state.revealed = true;

        tracing::info!("the draw took place");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{DrawBarrier, Outcome};
    use crate::{bet::Bet, store::memory::MemoryBetStore};

    fn bet(agency: u32, document: &str, number: i64) -> Bet {
        format!("{agency},Name,Surname,{document},2001-07-14,{number}")
            .parse()
            .unwrap()
    }

    fn winners(documents: &[&str]) -> Outcome {
        Outcome::Winners(documents.iter().map(|document| document.to_string()).collect())
    }

    fn setup(agencies: usize) -> (DrawBarrier, Arc<MemoryBetStore>) {
        let store = Arc::new(MemoryBetStore::with_bets(vec![
            bet(1, "111", 7574),
            bet(1, "112", 10),
            bet(2, "221", 7574),
            bet(2, "222", 7574),
            bet(3, "331", 9),
            bet(4, "441", 7574),
        ]));

        (DrawBarrier::new(agencies, store.clone()), store)
    }

    #[tokio::test]
    async fn pending_until_every_agency_asks() {
        let (barrier, store) = setup(2);

        assert_eq!(barrier.query(1).await, Outcome::Pending);
        assert!(!barrier.maybe_draw().await);
        assert_eq!(store.loads(), 0);

        // the second agency completes the set and gets its results at once
        assert_eq!(barrier.query(2).await, winners(&["221", "222"]));
        assert!(barrier.is_revealed().await);
        assert_eq!(barrier.query(1).await, winners(&["111"]));
        assert_eq!(store.loads(), 1);
    }

    #[tokio::test]
    async fn asking_again_before_the_draw_keeps_pending() {
        let (barrier, store) = setup(2);

        for _ in 0..5 {
            assert_eq!(barrier.query(1).await, Outcome::Pending);
        }

        assert!(!barrier.is_revealed().await);
        assert_eq!(store.loads(), 0);
    }

    #[tokio::test]
    async fn draw_runs_once_and_results_are_delivered_once() {
        let (barrier, store) = setup(3);

        assert_eq!(barrier.query(1).await, Outcome::Pending);
        assert_eq!(barrier.query(2).await, Outcome::Pending);
        assert_eq!(barrier.query(3).await, winners(&[]));

        assert_eq!(barrier.query(1).await, winners(&["111"]));
        // already delivered
        assert_eq!(barrier.query(1).await, winners(&[]));
        assert_eq!(barrier.query(2).await, winners(&["221", "222"]));
        assert_eq!(barrier.query(2).await, winners(&[]));

        // an agency that never waited still collects its winners once
        assert_eq!(barrier.query(4).await, winners(&["441"]));
        assert_eq!(barrier.query(4).await, winners(&[]));

        // unknown agencies have no winners
        assert_eq!(barrier.query(99).await, winners(&[]));

        assert!(barrier.maybe_draw().await);
        assert_eq!(store.loads(), 1);
    }

    #[tokio::test]
    async fn failed_scan_is_retried() {
        let (barrier, store) = setup(2);

        assert_eq!(barrier.query(1).await, Outcome::Pending);

        store.set_broken(true);
        assert_eq!(barrier.query(2).await, Outcome::Pending);
        assert!(!barrier.is_revealed().await);
        assert_eq!(store.loads(), 1);

        store.set_broken(false);
        assert!(barrier.maybe_draw().await);
        assert_eq!(store.loads(), 2);

        assert_eq!(barrier.query(2).await, winners(&["221", "222"]));
        assert_eq!(barrier.query(1).await, winners(&["111"]));
        assert_eq!(store.loads(), 2);
    }

    #[tokio::test]
    async fn concurrent_queries_scan_once() {
        let store = Arc::new(MemoryBetStore::with_bets(
            (1..=10).map(|agency| bet(agency, &agency.to_string(), 7574)).collect(),
        ));
        let barrier = Arc::new(DrawBarrier::new(10, store.clone()));

        let mut tasks = Vec::new();
        for agency in 1..=10 {
            let barrier = barrier.clone();
            tasks.push(tokio::spawn(async move {
                // keep asking until the results arrive
                loop {
                    match barrier.query(agency).await {
                        Outcome::Pending => tokio::task::yield_now().await,
                        Outcome::Winners(documents) => return (agency, documents),
                    }
                }
            }));
        }

        for task in tasks {
            let (agency, documents) = task.await.unwrap();
            assert_eq!(documents, [agency.to_string()]);
        }

        assert_eq!(store.loads(), 1);
        assert_eq!(store.len(), 10);
    }
}
