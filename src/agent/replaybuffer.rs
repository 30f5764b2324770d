use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;
use thiserror::Error;

use crate::game::config::ConfigError;
use crate::game::encoder::Observation;

#[derive(Debug, Error, PartialEq)]
pub enum ReplayError {
    #[error("requested {requested} transitions but only {available} are stored")]
    InsufficientData { requested: usize, available: usize },
}

/// One `(state, action, reward, next_state, terminal)` record.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Observation,
    pub action: usize,
    pub reward: f32,
    pub next_state: Observation,
    pub terminal: bool,
}

/// Fixed-capacity FIFO of transitions. Once full, each push evicts the
/// oldest entry; sampling never reorders anything.
pub struct ReplayBuffer {
    buffer: VecDeque<Transition>,
    capacity: usize
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            buffer: VecDeque::with_capacity(capacity.min(1 << 16)),
            capacity
        })
    }

    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    /// Draws `batch_size` distinct entries uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<&Transition>, ReplayError> {
        if self.buffer.len() < batch_size {
            return Err(ReplayError::InsufficientData {
                requested: batch_size,
                available: self.buffer.len(),
            });
        }

        let indices = rand::seq::index::sample(rng, self.buffer.len(), batch_size);
        Ok(indices.iter().map(|i| &self.buffer[i]).collect())
    }
}

impl IntoIterator for ReplayBuffer {
    type Item = Transition;
    type IntoIter = std::collections::vec_deque::IntoIter<Transition>;

    /// Oldest first.
    fn into_iter(self) -> Self::IntoIter {
        self.buffer.into_iter()
    }
}

/// A replay buffer shared between collector threads. Pushes are serialized by
/// the lock, so eviction order is the order in which pushes acquire it.
#[derive(Clone)]
pub struct SharedReplayBuffer {
    inner: Arc<Mutex<ReplayBuffer>>,
}

impl SharedReplayBuffer {
    pub fn new(buffer: ReplayBuffer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(buffer)),
        }
    }

    // a panicked pusher cannot leave the deque half-updated, so poison is ignored
    pub fn lock(&self) -> MutexGuard<'_, ReplayBuffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, transition: Transition) {
        self.lock().push(transition);
    }

    pub fn push_all<I: IntoIterator<Item = Transition>>(&self, transitions: I) {
        let mut guard = self.lock();
        for transition in transitions {
            guard.push(transition);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Takes the buffer back out once every other handle is gone.
    pub fn into_inner(self) -> Result<ReplayBuffer, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => Ok(mutex.into_inner().unwrap_or_else(PoisonError::into_inner)),
            Err(inner) => Err(Self { inner }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn transition(i: usize) -> Transition {
        Transition {
            state: vec![i as f32; 4],
            action: i % 4,
            reward: i as f32 * 10.0,
            next_state: vec![(i + 1) as f32; 4],
            terminal: i % 9 == 0,
        }
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert_eq!(ReplayBuffer::new(0).err(), Some(ConfigError::ZeroCapacity));
    }

    #[test]
    fn test_overflow_keeps_most_recent() {
        let mut buffer = ReplayBuffer::new(100).unwrap();
        for i in 0..110 {
            buffer.push(transition(i));
        }
        assert_eq!(buffer.len(), 100);

        let kept: Vec<f32> = buffer.iter().map(|t| t.state[0]).collect();
        let expected: Vec<f32> = (10..110).map(|i| i as f32).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn test_sample_without_duplicates() {
        let mut buffer = ReplayBuffer::new(50).unwrap();
        for i in 0..20 {
            buffer.push(transition(i));
        }
        let mut rng = StdRng::seed_from_u64(0);

        let batch = buffer.sample(20, &mut rng).unwrap();
        let distinct: HashSet<usize> = batch.iter().map(|t| t.action * 1000 + t.state[0] as usize).collect();
        assert_eq!(distinct.len(), 20);
    }

    #[test]
    fn test_sample_insufficient_data() {
        let mut buffer = ReplayBuffer::new(10).unwrap();
        buffer.push(transition(0));
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            buffer.sample(2, &mut rng).err(),
            Some(ReplayError::InsufficientData { requested: 2, available: 1 })
        );
    }

    #[test]
    fn test_sampling_does_not_change_eviction_order() {
        let mut buffer = ReplayBuffer::new(3).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        for i in 0..3 {
            buffer.push(transition(i));
        }
        let _ = buffer.sample(3, &mut rng).unwrap();
        buffer.push(transition(3));
        assert_eq!(buffer.iter().next().unwrap().state[0], 1.0);
    }

    #[test]
    fn test_shared_buffer_serializes_pushes() {
        let shared = SharedReplayBuffer::new(ReplayBuffer::new(1000).unwrap());
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let shared = shared.clone();
                scope.spawn(move || {
                    for i in 0..100 {
                        shared.push(transition(worker * 100 + i));
                    }
                });
            }
        });
        assert_eq!(shared.len(), 400);
        let buffer = shared.into_inner().ok().unwrap();
        assert_eq!(buffer.len(), 400);
    }
}
