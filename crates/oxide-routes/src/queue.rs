//! Ordered merge queue.
//!
//! Every plugin and the host application get a fixed slot around the inner
//! action. The `before` list runs in plugin priority order and the `after`
//! list in reverse, so the plugin set up first is torn down last:
//!
//! ```text
//! before: [early, plugin 0 .. plugin n-1, before-custom, inner]
//! after:  [after-custom, plugin n-1 .. plugin 0, late]
//! ```

use indexmap::IndexMap;

use crate::declaration::Stage;
use crate::error::{Result, RouterError};

/// Half of the queue a plugin slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Ahead of the inner action.
    Before,
    /// Behind the inner action.
    After,
}

/// Identity of one queue position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Host application `early` routes.
    Early,
    /// A plugin's routes for one phase.
    Plugin {
        /// Plugin priority index, `0` being the most depended-upon.
        index: usize,
        /// Queue half.
        phase: Phase,
    },
    /// Host application `before` routes.
    BeforeCustom,
    /// Blueprint routes: the action every other slot wraps.
    Inner,
    /// Host application `after` routes.
    AfterCustom,
    /// Host application `late` routes.
    Late,
}

/// Slot contents that can be vacant.
pub trait SlotContent {
    /// Returns `true` if the slot holds nothing worth keeping.
    fn is_vacant(&self) -> bool;
}

impl<K, V, S> SlotContent for IndexMap<K, V, S> {
    fn is_vacant(&self) -> bool {
        self.is_empty()
    }
}

impl<T> SlotContent for Vec<T> {
    fn is_vacant(&self) -> bool {
        self.is_empty()
    }
}

/// Two ordered slot lists around the inner action.
///
/// Slots are addressable until [`compact`](Self::compact) drops the vacant
/// ones; after that only the ordered views remain.
///
/// ```
/// use oxide_routes::{MergeQueue, Phase, Slot};
///
/// let mut queue: MergeQueue<Vec<&str>> = MergeQueue::new(2);
/// queue.slot_for_plugin(0, Phase::Before).unwrap().push("auth");
/// queue.slot_for_plugin(1, Phase::Before).unwrap().push("csrf");
/// queue.inner_action_slot().unwrap().push("blueprints");
/// queue.compact();
///
/// let order: Vec<Slot> = queue.before().iter().map(|(slot, _)| *slot).collect();
/// assert_eq!(order.len(), 3);
/// assert_eq!(order[2], Slot::Inner);
/// assert!(queue.slot(Slot::Inner).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct MergeQueue<T> {
    before: Vec<(Slot, T)>,
    after: Vec<(Slot, T)>,
    plugins: usize,
    compacted: bool,
}

impl<T: Default> MergeQueue<T> {
    /// Lays out the slots for `plugins` plugins.
    pub fn new(plugins: usize) -> Self {
        let mut before = Vec::with_capacity(plugins + 3);
        before.push((Slot::Early, T::default()));
        for index in 0..plugins {
            before.push((
                Slot::Plugin {
                    index,
                    phase: Phase::Before,
                },
                T::default(),
            ));
        }
        before.push((Slot::BeforeCustom, T::default()));
        before.push((Slot::Inner, T::default()));

        let mut after = Vec::with_capacity(plugins + 2);
        after.push((Slot::AfterCustom, T::default()));
        for index in (0..plugins).rev() {
            after.push((
                Slot::Plugin {
                    index,
                    phase: Phase::After,
                },
                T::default(),
            ));
        }
        after.push((Slot::Late, T::default()));

        Self {
            before,
            after,
            plugins,
            compacted: false,
        }
    }
}

impl<T> MergeQueue<T> {
    /// Number of plugin slots per phase.
    pub fn plugin_count(&self) -> usize {
        self.plugins
    }

    /// The slot of plugin `index` for `phase`.
    pub fn slot_for_plugin(&mut self, index: usize, phase: Phase) -> Result<&mut T> {
        self.slot_mut(Slot::Plugin { index, phase })
    }

    /// The host application slot for `stage`.
    pub fn slot_for_host(&mut self, stage: Stage) -> Result<&mut T> {
        let slot = match stage {
            Stage::Early => Slot::Early,
            Stage::Before => Slot::BeforeCustom,
            Stage::After => Slot::AfterCustom,
            Stage::Late => Slot::Late,
        };
        self.slot_mut(slot)
    }

    /// The inner action slot, last in the `before` list.
    pub fn inner_action_slot(&mut self) -> Result<&mut T> {
        self.slot_mut(Slot::Inner)
    }

    /// Read access to one slot.
    pub fn slot(&self, slot: Slot) -> Result<&T> {
        self.check_addressable(slot)?;
        self.before
            .iter()
            .chain(&self.after)
            .find(|(candidate, _)| *candidate == slot)
            .map(|(_, content)| content)
            .ok_or_else(|| self.out_of_range(slot))
    }

    /// Write access to one slot.
    pub fn slot_mut(&mut self, slot: Slot) -> Result<&mut T> {
        self.check_addressable(slot)?;
        let missing = self.out_of_range(slot);
        self.before
            .iter_mut()
            .chain(&mut self.after)
            .find(|(candidate, _)| *candidate == slot)
            .map(|(_, content)| content)
            .ok_or(missing)
    }

    /// Drops every slot for which `keep` is false, preserving order.
    ///
    /// Slot-addressed access fails with [`RouterError::QueueCompacted`] from
    /// here on.
    pub fn compact_by<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Slot, &T) -> bool,
    {
        self.before.retain(|(slot, content)| keep(slot, content));
        self.after.retain(|(slot, content)| keep(slot, content));
        self.compacted = true;
    }

    /// Returns `true` once the queue has been compacted.
    pub fn is_compacted(&self) -> bool {
        self.compacted
    }

    /// Slots ahead of and including the inner action, in order.
    pub fn before(&self) -> &[(Slot, T)] {
        &self.before
    }

    /// Slots behind the inner action, in order.
    pub fn after(&self) -> &[(Slot, T)] {
        &self.after
    }

    /// Consumes the queue into its `before` and `after` lists.
    pub fn into_lists(self) -> (Vec<(Slot, T)>, Vec<(Slot, T)>) {
        (self.before, self.after)
    }

    fn check_addressable(&self, slot: Slot) -> Result<()> {
        if self.compacted {
            return Err(RouterError::QueueCompacted);
        }
        match slot {
            Slot::Plugin { index, .. } if index >= self.plugins => Err(self.out_of_range(slot)),
            _ => Ok(()),
        }
    }

    fn out_of_range(&self, slot: Slot) -> RouterError {
        let index = match slot {
            Slot::Plugin { index, .. } => index,
            _ => self.plugins,
        };
        RouterError::SlotOutOfRange {
            index,
            len: self.plugins,
        }
    }
}

impl<T: SlotContent> MergeQueue<T> {
    /// Drops vacant slots.
    pub fn compact(&mut self) {
        self.compact_by(|_, content| !content.is_vacant());
    }
}
