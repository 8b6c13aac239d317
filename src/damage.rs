use std::sync::mpsc::{self, Receiver, Sender};

use crate::geometry::PixelRect;

/// Region that changed and needs a redraw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Damage {
    /// Pixels of one layer changed inside `rect` (inclusive).
    Layer { index: usize, rect: PixelRect },
    /// The selection outline changed.
    Selection,
    /// The whole stack was replaced (open, new canvas, project load).
    Document,
}

/// Fan-out of damage events to any number of renderers.
///
/// Subscribers that dropped their receiver are pruned on the next send.
#[derive(Default)]
pub struct DamageNotifier {
    subscribers: Vec<Sender<Damage>>,
    sent: u64,
}

impl DamageNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<Damage> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn notify(&mut self, damage: Damage) {
        self.sent += 1;
        self.subscribers.retain(|tx| tx.send(damage).is_ok());
    }

    /// Total events emitted since creation.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    #[test]
    fn every_subscriber_receives_events() {
        let mut n = DamageNotifier::new();
        let a = n.subscribe();
        let b = n.subscribe();
        let rect = PixelRect::from_point(Point::new(1, 1));
        n.notify(Damage::Layer { index: 0, rect });
        assert_eq!(a.try_recv().ok(), Some(Damage::Layer { index: 0, rect }));
        assert_eq!(b.try_recv().ok(), Some(Damage::Layer { index: 0, rect }));
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let mut n = DamageNotifier::new();
        let kept = n.subscribe();
        drop(n.subscribe());
        n.notify(Damage::Selection);
        assert_eq!(n.subscriber_count(), 1);
        assert_eq!(kept.try_recv().ok(), Some(Damage::Selection));
        assert_eq!(n.sent(), 1);
    }
}
