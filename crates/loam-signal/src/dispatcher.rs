//! The [`Dispatcher`]: per-event-type handler lists plus deferred queues.
//!
//! Every method takes `&self`, so handlers receive the dispatcher itself and
//! may trigger, enqueue, connect or disconnect while being delivered to.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::sink::{Connection, Sink};

// ---------------------------------------------------------------------------
// Handler slots
// ---------------------------------------------------------------------------

/// Identity of a connected handler, used to reject duplicates and to
/// disconnect by function (and context).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandlerKey {
    /// A plain function, by address.
    Free(usize),
    /// A function bound to a shared context, by function and context address.
    Bound { func: usize, context: usize },
}

pub(crate) type Invoke<E> = Rc<dyn Fn(&mut E, &Dispatcher)>;

pub(crate) struct Slot<E> {
    /// `None` for closures, which have no comparable identity.
    pub(crate) key: Option<HandlerKey>,
    pub(crate) connection: Connection,
    /// Cleared on disconnect so passes already in flight skip the handler.
    pub(crate) live: Rc<Cell<bool>>,
    pub(crate) invoke: Invoke<E>,
}

impl<E> Clone for Slot<E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            connection: self.connection,
            live: Rc::clone(&self.live),
            invoke: Rc::clone(&self.invoke),
        }
    }
}

impl<E> Slot<E> {
    fn kill(&self) {
        self.live.set(false);
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Handlers and pending events for one event type.
pub(crate) struct Channel<E> {
    pub(crate) handlers: Vec<Slot<E>>,
    queue: Vec<E>,
}

impl<E> Default for Channel<E> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            queue: Vec::new(),
        }
    }
}

impl<E> Channel<E> {
    /// Remove every handler matching `pred`. Returns how many were removed.
    pub(crate) fn disconnect_where(&mut self, mut pred: impl FnMut(&Slot<E>) -> bool) -> usize {
        let before = self.handlers.len();
        self.handlers.retain(|slot| {
            if pred(slot) {
                slot.kill();
                false
            } else {
                true
            }
        });
        before - self.handlers.len()
    }
}

/// Type-erased channel interface, so the dispatcher can drain and tear down
/// channels without knowing their event types.
trait ErasedChannel {
    fn event_name(&self) -> &'static str;
    fn pending(&self) -> usize;
    fn handler_count(&self) -> usize;
    /// Swap the queue out, if it holds anything.
    fn take_pending(&mut self) -> Option<Box<dyn PendingEvents>>;
    fn clear_queue(&mut self) -> usize;
    fn disconnect_all(&mut self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: 'static> ErasedChannel for Channel<E> {
    fn event_name(&self) -> &'static str {
        std::any::type_name::<E>()
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    fn take_pending(&mut self) -> Option<Box<dyn PendingEvents>> {
        if self.queue.is_empty() {
            return None;
        }
        Some(Box::new(Batch(std::mem::take(&mut self.queue))))
    }

    fn clear_queue(&mut self) -> usize {
        let discarded = self.queue.len();
        self.queue.clear();
        discarded
    }

    fn disconnect_all(&mut self) -> usize {
        self.disconnect_where(|_| true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A drained queue waiting to be delivered.
trait PendingEvents {
    /// Deliver the events in FIFO order until the dispatcher is torn down.
    /// Returns the number of events delivered.
    fn deliver(self: Box<Self>, dispatcher: &Dispatcher, epoch: u64) -> usize;
}

struct Batch<E>(Vec<E>);

impl<E: 'static> Batch<E> {
    fn drain(self, dispatcher: &Dispatcher, epoch: u64) -> usize {
        let mut delivered = 0;
        for mut event in self.0 {
            if dispatcher.epoch() != epoch {
                break;
            }
            dispatcher.trigger_ref(&mut event);
            delivered += 1;
        }
        delivered
    }
}

impl<E: 'static> PendingEvents for Batch<E> {
    fn deliver(self: Box<Self>, dispatcher: &Dispatcher, epoch: u64) -> usize {
        (*self).drain(dispatcher, epoch)
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    /// In registration order; never shrinks.
    channels: Vec<Box<dyn ErasedChannel>>,
    index: HashMap<TypeId, usize>,
    last_connection: u64,
    /// Bumped by every teardown; swapped-out batches stop when it changes.
    epoch: u64,
}

impl State {
    fn channel<E: 'static>(&self) -> Option<&Channel<E>> {
        let idx = *self.index.get(&TypeId::of::<E>())?;
        Some(
            self.channels[idx]
                .as_any()
                .downcast_ref::<Channel<E>>()
                .expect("channel stored under the wrong event type"),
        )
    }

    fn channel_mut<E: 'static>(&mut self) -> Option<&mut Channel<E>> {
        let idx = *self.index.get(&TypeId::of::<E>())?;
        Some(
            self.channels[idx]
                .as_any_mut()
                .downcast_mut::<Channel<E>>()
                .expect("channel stored under the wrong event type"),
        )
    }

    fn channel_or_insert<E: 'static>(&mut self) -> &mut Channel<E> {
        if !self.index.contains_key(&TypeId::of::<E>()) {
            self.index.insert(TypeId::of::<E>(), self.channels.len());
            self.channels.push(Box::new(Channel::<E>::default()));
            tracing::trace!(event = std::any::type_name::<E>(), "channel created");
        }
        self.channel_mut::<E>()
            .expect("channel registered just above")
    }
}

/// Typed publish/subscribe event dispatcher.
///
/// Events are plain values of any `'static` type. Handlers for an event type
/// run in the order they were connected. [`trigger`](Self::trigger) delivers
/// immediately and depth-first; [`enqueue`](Self::enqueue) buffers until the
/// next [`update`](Self::update).
///
/// The dispatcher is single-threaded (`!Send`). Instances are independent.
#[derive(Default)]
pub struct Dispatcher {
    state: RefCell<State>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        let mut map = f.debug_map();
        for channel in &state.channels {
            map.entry(
                &channel.event_name(),
                &format_args!(
                    "{} handlers, {} pending",
                    channel.handler_count(),
                    channel.pending()
                ),
            );
        }
        map.finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher with no handlers and no pending events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler list for event type `E`.
    pub fn sink<E: 'static>(&self) -> Sink<'_, E> {
        Sink::new(self)
    }

    fn epoch(&self) -> u64 {
        self.state.borrow().epoch
    }

    // -- used by Sink -------------------------------------------------------

    pub(crate) fn has_key<E: 'static>(&self, key: HandlerKey) -> bool {
        self.state.borrow().channel::<E>().is_some_and(|channel| {
            channel.handlers.iter().any(|slot| slot.key == Some(key))
        })
    }

    pub(crate) fn push_slot<E: 'static>(
        &self,
        key: Option<HandlerKey>,
        invoke: Invoke<E>,
    ) -> Connection {
        let mut state = self.state.borrow_mut();
        state.last_connection += 1;
        let connection = Connection(state.last_connection);
        state.channel_or_insert::<E>().handlers.push(Slot {
            key,
            connection,
            live: Rc::new(Cell::new(true)),
            invoke,
        });
        tracing::trace!(
            event = std::any::type_name::<E>(),
            connection = connection.0,
            "handler connected"
        );
        connection
    }

    pub(crate) fn disconnect_where<E: 'static>(&self, pred: impl FnMut(&Slot<E>) -> bool) -> usize {
        let mut state = self.state.borrow_mut();
        let removed = state
            .channel_mut::<E>()
            .map_or(0, |channel| channel.disconnect_where(pred));
        if removed > 0 {
            tracing::trace!(
                event = std::any::type_name::<E>(),
                removed,
                "handlers disconnected"
            );
        }
        removed
    }

    pub(crate) fn handler_count<E: 'static>(&self) -> usize {
        self.state
            .borrow()
            .channel::<E>()
            .map_or(0, |channel| channel.handlers.len())
    }

    // -- immediate delivery -------------------------------------------------

    /// Deliver `event` to every handler of `E` and hand it back.
    pub fn trigger<E: 'static>(&self, mut event: E) -> E {
        self.trigger_ref(&mut event);
        event
    }

    /// Deliver `event` by mutable reference to every handler of `E`, in
    /// connection order. Returns how many handlers ran.
    ///
    /// Handlers may trigger further events, including events delivered back
    /// to themselves; those run to completion before this pass continues.
    /// The handler list is captured when the call starts: a handler
    /// disconnected mid-pass is skipped from then on, a handler connected
    /// mid-pass first runs on the next pass.
    pub fn trigger_ref<E: 'static>(&self, event: &mut E) -> usize {
        let slots: Vec<Slot<E>> = {
            let state = self.state.borrow();
            match state.channel::<E>() {
                Some(channel) => channel.handlers.clone(),
                None => return 0,
            }
        };

        let mut invoked = 0;
        for slot in &slots {
            if !slot.live.get() {
                continue;
            }
            (slot.invoke)(event, self);
            invoked += 1;
        }
        tracing::trace!(
            event = std::any::type_name::<E>(),
            handlers = invoked,
            "event triggered"
        );
        invoked
    }

    // -- deferred delivery --------------------------------------------------

    /// Buffer `event` until the next [`update`](Self::update) or
    /// [`update_type`](Self::update_type). No handler runs now.
    pub fn enqueue<E: 'static>(&self, event: E) {
        self.state
            .borrow_mut()
            .channel_or_insert::<E>()
            .queue
            .push(event);
    }

    /// Number of buffered events of type `E`.
    pub fn pending<E: 'static>(&self) -> usize {
        self.state
            .borrow()
            .channel::<E>()
            .map_or(0, |channel| channel.queue.len())
    }

    /// Deliver every buffered event, channel by channel in the order event
    /// types were first seen, FIFO within a type. Returns the number of
    /// events delivered.
    ///
    /// Every buffer is swapped out before the first event is delivered, so
    /// events enqueued by handlers during this call, of any type, wait for
    /// the next one. A [`teardown`](Self::teardown) from a handler discards
    /// whatever this call has not delivered yet.
    pub fn update(&self) -> usize {
        let (batches, epoch) = {
            let mut state = self.state.borrow_mut();
            let batches: Vec<Box<dyn PendingEvents>> = state
                .channels
                .iter_mut()
                .filter_map(|channel| channel.take_pending())
                .collect();
            (batches, state.epoch)
        };
        let mut delivered = 0;
        for batch in batches {
            delivered += batch.deliver(self, epoch);
        }
        if delivered > 0 {
            tracing::debug!(delivered, "queued events delivered");
        }
        delivered
    }

    /// Like [`update`](Self::update), for event type `E` only.
    pub fn update_type<E: 'static>(&self) -> usize {
        let (batch, epoch) = {
            let mut state = self.state.borrow_mut();
            let queue = state
                .channel_mut::<E>()
                .map(|channel| std::mem::take(&mut channel.queue))
                .unwrap_or_default();
            (Batch(queue), state.epoch)
        };
        let delivered = batch.drain(self, epoch);
        if delivered > 0 {
            tracing::debug!(
                event = std::any::type_name::<E>(),
                delivered,
                "queued events delivered"
            );
        }
        delivered
    }

    // -- cleanup ------------------------------------------------------------

    /// Discard buffered events of type `E`. Returns how many were dropped.
    pub fn clear<E: 'static>(&self) -> usize {
        self.state
            .borrow_mut()
            .channel_mut::<E>()
            .map_or(0, |channel| channel.clear_queue())
    }

    /// Discard every buffered event. Returns how many were dropped.
    pub fn clear_all(&self) -> usize {
        self.state
            .borrow_mut()
            .channels
            .iter_mut()
            .map(|channel| channel.clear_queue())
            .sum()
    }

    /// Disconnect every handler and discard every buffered event.
    ///
    /// Safe to call repeatedly, and from inside a handler: trigger passes and
    /// updates already in flight stop delivering.
    pub fn teardown(&self) {
        let mut state = self.state.borrow_mut();
        state.epoch += 1;
        let mut handlers = 0;
        let mut events = 0;
        for channel in &mut state.channels {
            handlers += channel.disconnect_all();
            events += channel.clear_queue();
        }
        if handlers > 0 || events > 0 {
            tracing::debug!(handlers, events, "dispatcher torn down");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
