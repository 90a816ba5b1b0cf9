//! [`Sink`]: connect and disconnect handlers for one event type.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::dispatcher::{Dispatcher, HandlerKey, Invoke};
use crate::DispatchError;

/// A free-function handler.
///
/// Handlers receive the event by mutable reference plus the dispatcher, so
/// they can trigger or enqueue follow-up events.
pub type Handler<E> = fn(&mut E, &Dispatcher);

/// A handler bound to a shared context object.
///
/// The context is passed by shared reference: state that handlers update
/// lives behind the context's own `Cell`/`RefCell` fields, borrowed only as
/// long as each update needs. A handler can then trigger an event that is
/// delivered back to the same context.
pub type BoundHandler<C, E> = fn(&C, &mut E, &Dispatcher);

/// Opaque id of one connected handler, usable with [`Sink::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Connection(pub(crate) u64);

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

fn context_addr<C>(context: &Rc<C>) -> usize {
    Rc::as_ptr(context) as *const () as usize
}

/// Handler list for event type `E`, obtained from [`Dispatcher::sink`].
///
/// Functions are identified by address. Two distinct functions with
/// identical bodies may be merged by the compiler, so prefer [`release`]
/// with the returned [`Connection`] when that matters.
///
/// [`release`]: Sink::release
pub struct Sink<'d, E> {
    dispatcher: &'d Dispatcher,
    _event: PhantomData<fn(E)>,
}

impl<'d, E: 'static> Sink<'d, E> {
    pub(crate) fn new(dispatcher: &'d Dispatcher) -> Self {
        Self {
            dispatcher,
            _event: PhantomData,
        }
    }

    /// Connect a free function.
    ///
    /// # Errors
    ///
    /// [`DispatchError::AlreadyConnected`] if `func` is already connected to
    /// this event type.
    pub fn connect(&self, func: Handler<E>) -> Result<Connection, DispatchError> {
        let key = HandlerKey::Free(func as usize);
        self.reject_duplicate(key)?;
        let invoke: Invoke<E> = Rc::new(func);
        Ok(self.dispatcher.push_slot(Some(key), invoke))
    }

    /// Connect a function bound to `context`. The dispatcher keeps a strong
    /// reference to the context until the handler is disconnected.
    ///
    /// # Errors
    ///
    /// [`DispatchError::AlreadyConnected`] if the same function is already
    /// connected with the same context.
    pub fn connect_with<C: 'static>(
        &self,
        context: &Rc<C>,
        func: BoundHandler<C, E>,
    ) -> Result<Connection, DispatchError> {
        let key = HandlerKey::Bound {
            func: func as usize,
            context: context_addr(context),
        };
        self.reject_duplicate(key)?;
        let context = Rc::clone(context);
        let invoke: Invoke<E> = Rc::new(move |event: &mut E, dispatcher: &Dispatcher| {
            func(&context, event, dispatcher);
        });
        Ok(self.dispatcher.push_slot(Some(key), invoke))
    }

    /// Connect a closure. Closures cannot be compared, so every call adds a
    /// new handler; disconnect it with [`release`](Self::release).
    ///
    /// The closure may be re-entered by a nested trigger, so captured state
    /// goes behind `Cell`/`RefCell`.
    pub fn connect_fn<F>(&self, handler: F) -> Connection
    where
        F: Fn(&mut E, &Dispatcher) + 'static,
    {
        let invoke: Invoke<E> = Rc::new(handler);
        self.dispatcher.push_slot(None, invoke)
    }

    fn reject_duplicate(&self, key: HandlerKey) -> Result<(), DispatchError> {
        if self.dispatcher.has_key::<E>(key) {
            return Err(DispatchError::AlreadyConnected {
                event: std::any::type_name::<E>(),
            });
        }
        Ok(())
    }

    /// Disconnect a free function. Returns whether it was connected.
    pub fn disconnect(&self, func: Handler<E>) -> bool {
        let key = HandlerKey::Free(func as usize);
        self.dispatcher
            .disconnect_where::<E>(|slot| slot.key == Some(key))
            > 0
    }

    /// Disconnect `func` bound to `context`. Returns whether it was connected.
    pub fn disconnect_with<C: 'static>(
        &self,
        context: &Rc<C>,
        func: BoundHandler<C, E>,
    ) -> bool {
        let key = HandlerKey::Bound {
            func: func as usize,
            context: context_addr(context),
        };
        self.dispatcher
            .disconnect_where::<E>(|slot| slot.key == Some(key))
            > 0
    }

    /// Disconnect every handler of `E` bound to `context`. Returns whether
    /// any was connected.
    pub fn disconnect_context<C: 'static>(&self, context: &Rc<C>) -> bool {
        let addr = context_addr(context);
        self.dispatcher.disconnect_where::<E>(|slot| {
            matches!(slot.key, Some(HandlerKey::Bound { context, .. }) if context == addr)
        }) > 0
    }

    /// Disconnect the handler registered under `connection`.
    pub fn release(&self, connection: Connection) -> bool {
        self.dispatcher
            .disconnect_where::<E>(|slot| slot.connection == connection)
            > 0
    }

    /// Number of connected handlers.
    pub fn len(&self) -> usize {
        self.dispatcher.handler_count::<E>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> fmt::Debug for Sink<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("event", &std::any::type_name::<E>())
            .finish()
    }
}
