//! Reentrant two-phase barrier
//!
//! A single-phase counting barrier cannot be reused in a loop: a fast
//! participant may re-enter before a slow one has consumed its release, and
//! steal that release. Here every `wait()` passes through two phases. Each
//! phase resets the *other* phase's counter when it fires, so by the time
//! anyone can re-enter phase A, all participants have already consumed their
//! phase A permits.

use tokio::sync::{Mutex, Semaphore};
use tracing::trace;

use crate::core::errors::{ClusterError, Result};

#[derive(Debug)]
struct PhaseCounters {
    arriving: usize,
    departing: usize,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Arrive,
    Depart,
}

/// Reusable rendezvous for a fixed number of participants
#[derive(Debug)]
pub struct ReentrantBarrier {
    parties: usize,
    counters: Mutex<PhaseCounters>,
    arrive: Semaphore,
    depart: Semaphore,
}

impl ReentrantBarrier {
    pub fn new(parties: usize) -> Result<Self> {
        if parties == 0 {
            return Err(ClusterError::configuration_field(
                "barrier needs at least one participant",
                "parties",
            ));
        }
        Ok(Self {
            parties,
            counters: Mutex::new(PhaseCounters {
                arriving: parties,
                departing: parties,
            }),
            arrive: Semaphore::new(0),
            depart: Semaphore::new(0),
        })
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Block until all participants have called `wait` in this round
    pub async fn wait(&self) -> Result<()> {
        self.phase(Phase::Arrive).await?;
        self.phase(Phase::Depart).await
    }

    async fn phase(&self, phase: Phase) -> Result<()> {
        {
            let mut guard = self.counters.lock().await;
            let counters = &mut *guard;
            let (count, other) = match phase {
                Phase::Arrive => (&mut counters.arriving, &mut counters.departing),
                Phase::Depart => (&mut counters.departing, &mut counters.arriving),
            };
            *count -= 1;
            if *count == 0 {
                trace!(?phase, parties = self.parties, "Barrier phase released");
                self.release(phase).add_permits(self.parties);
                *other = self.parties;
            }
        }

        self.release(phase).acquire().await?.forget();
        Ok(())
    }

    fn release(&self, phase: Phase) -> &Semaphore {
        match phase {
            Phase::Arrive => &self.arrive,
            Phase::Depart => &self.depart,
        }
    }
}
