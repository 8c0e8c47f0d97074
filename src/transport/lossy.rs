//! Fault injection for outgoing datagrams.
//!
//! Real networks drop, duplicate and reorder datagrams. [`LossyTransport`] wraps another
//! transport and does the same to everything sent through it, either at random (seeded, so
//! runs are reproducible) or as dictated by a script.

use std::io;
use std::time;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use super::Transport;

/// What happens to one outgoing datagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Deliver,
    Drop,
    /// Deliver twice.
    Duplicate,
    /// Deliver after the next datagram that goes out, so the two arrive swapped. At most one
    /// datagram is held at a time; holding another releases the previous one.
    Hold,
}

/// Percentages of outgoing datagrams affected by each fault. The buckets are disjoint, so their
/// sum should not exceed 100.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaultRates {
    pub loss_percent: u8,
    pub duplicate_percent: u8,
    pub reorder_percent: u8,
}

impl FaultRates {
    pub fn loss(loss_percent: u8) -> Self {
        Self {
            loss_percent,
            ..Default::default()
        }
    }
}

/// Counts of what happened to outgoing datagrams.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub delivered: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub held: u64,
}

type Script = Box<dyn FnMut(&[u8]) -> Verdict + Send>;

enum Faults {
    Random { rates: FaultRates, rng: StdRng },
    Scripted(Script),
}

#[derive(Clone, Copy)]
enum Route {
    Send,
    Reply,
}

pub struct LossyTransport<T> {
    inner: T,
    faults: Faults,
    held: Option<(Route, Box<[u8]>)>,
    stats: FaultStats,
}

impl<T> LossyTransport<T>
where
    T: Transport,
{
    /// Applies faults at random according to `rates`, using an RNG seeded with `seed`.
    pub fn random(inner: T, rates: FaultRates, seed: u64) -> Self {
        Self::with_faults(
            inner,
            Faults::Random {
                rates,
                rng: StdRng::seed_from_u64(seed),
            },
        )
    }

    /// Asks `script` what to do with each outgoing datagram.
    pub fn scripted<F>(inner: T, script: F) -> Self
    where
        F: FnMut(&[u8]) -> Verdict + Send + 'static,
    {
        Self::with_faults(inner, Faults::Scripted(Box::new(script)))
    }

    fn with_faults(inner: T, faults: Faults) -> Self {
        Self {
            inner,
            faults,
            held: None,
            stats: FaultStats::default(),
        }
    }

    pub fn stats(&self) -> FaultStats {
        self.stats
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn verdict(&mut self, datagram: &[u8]) -> Verdict {
        match &mut self.faults {
            Faults::Random { rates, rng } => {
                let roll = rng.gen_range(0..100u32);

                let drop_max = u32::from(rates.loss_percent);
                let duplicate_max = drop_max + u32::from(rates.duplicate_percent);
                let hold_max = duplicate_max + u32::from(rates.reorder_percent);

                if roll < drop_max {
                    Verdict::Drop
                } else if roll < duplicate_max {
                    Verdict::Duplicate
                } else if roll < hold_max {
                    Verdict::Hold
                } else {
                    Verdict::Deliver
                }
            }
            Faults::Scripted(script) => script(datagram),
        }
    }

    fn forward(&mut self, route: Route, datagram: &[u8]) -> io::Result<()> {
        self.stats.delivered += 1;

        match route {
            Route::Send => self.inner.send(datagram),
            Route::Reply => self.inner.reply(datagram),
        }
    }

    fn release_held(&mut self) -> io::Result<()> {
        match self.held.take() {
            Some((route, datagram)) => self.forward(route, &datagram),
            None => Ok(()),
        }
    }

    fn apply(&mut self, route: Route, datagram: &[u8]) -> io::Result<()> {
        match self.verdict(datagram) {
            Verdict::Deliver => {
                self.forward(route, datagram)?;
                self.release_held()
            }
            Verdict::Drop => {
                trace!("dropping {} byte datagram", datagram.len());
                self.stats.dropped += 1;
                Ok(())
            }
            Verdict::Duplicate => {
                trace!("duplicating {} byte datagram", datagram.len());
                self.stats.duplicated += 1;
                self.forward(route, datagram)?;
                self.forward(route, datagram)?;
                self.release_held()
            }
            Verdict::Hold => {
                trace!("holding back {} byte datagram", datagram.len());
                self.stats.held += 1;
                self.release_held()?;
                self.held = Some((route, datagram.into()));
                Ok(())
            }
        }
    }
}

impl<T> Transport for LossyTransport<T>
where
    T: Transport,
{
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.apply(Route::Send, datagram)
    }

    fn reply(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.apply(Route::Reply, datagram)
    }

    fn try_recv(&mut self) -> io::Result<Option<&[u8]>> {
        self.inner.try_recv()
    }

    fn wait_recv(&mut self, timeout: Option<time::Duration>) -> io::Result<Option<&[u8]>> {
        self.inner.wait_recv(timeout)
    }
}
