//! Event dispatcher for postbus.
//!
//! This module provides the [`EventBus`], which keeps the handler registry and
//! routes every posted event to the handlers of its type and of each ancestor
//! type.
//!
//! # Delivery
//!
//! When an event is posted:
//!
//! 1. Its type chain is resolved (specific first, universal root last when a
//!    catch-all handler exists)
//! 2. The handlers of every resolved type are snapshotted, type-major and then
//!    in insertion order
//! 3. Every handler in the snapshot is invoked, each one isolated from the
//!    others' failures
//! 4. If the snapshot was empty, a [`DeadEvent`] wrapping the event is posted
//!
//! ```rust,ignore
//! use postbus_core::EventBus;
//!
//! let bus = EventBus::new();
//!
//! let sub = bus.subscribe(|order: &Order| println!("order {}", order.id));
//! bus.subscribe(|special: &SpecialOrder| println!("priority {}", special.priority));
//!
//! // Both handlers run, specific type first
//! assert_eq!(bus.post(SpecialOrder::new(1, 5)), 2);
//!
//! sub.unsubscribe();
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{Level, debug, span, trace};

use crate::dead_event::{DeadEvent, NO_SUBSCRIBERS};
use crate::deferred::{DeferredEventBus, Executor, SpawnExecutor};
use crate::error::HandlerError;
use crate::event::{BoxedEvent, Event, EventType};
use crate::handler::{ErasedHandler, HandlerOutcome, HandlerRecord, erase, erase_any};
use crate::registry::{SharedRegistry, Subscription};
use crate::reporter::{ExceptionContext, ExceptionReporter, LoggingReporter};
use crate::resolver::TypeResolver;

struct BusInner {
    registry: SharedRegistry,
    resolver: TypeResolver,
    reporter: Arc<dyn ExceptionReporter>,
    /// `None` delivers inline; `Some` hands each invocation to the executor.
    executor: Option<Arc<dyn Executor>>,
}

/// The central publish/subscribe dispatcher.
///
/// `EventBus` is a cheap handle: clones share the same registry, cache, and
/// configuration.
///
/// # Thread Safety
///
/// `EventBus` is `Send + Sync`. No lock is held while a handler or the
/// exception reporter runs, so handlers may freely post, subscribe, or
/// unsubscribe on the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a synchronous bus with the logging exception reporter.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder for configuring a bus.
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Registers `handler` for events of type `E` and any type derived from it.
    ///
    /// Every call creates a distinct subscription, even for the same callback.
    pub fn subscribe<E, F, R>(&self, handler: F) -> Subscription
    where
        E: Event,
        F: Fn(&E) -> R + Send + Sync + 'static,
        R: HandlerOutcome,
    {
        self.register(
            EventType::of::<E>(),
            std::any::type_name::<F>(),
            erase(handler),
        )
    }

    /// Registers `handler` against the universal root type, so it receives
    /// every posted event, dead events included.
    pub fn subscribe_any<F, R>(&self, handler: F) -> Subscription
    where
        F: Fn(&dyn Event) -> R + Send + Sync + 'static,
        R: HandlerOutcome,
    {
        self.register(
            EventType::any(),
            std::any::type_name::<F>(),
            erase_any(handler),
        )
    }

    fn register(
        &self,
        event_type: EventType,
        name: &'static str,
        callback: ErasedHandler,
    ) -> Subscription {
        let record = HandlerRecord::new(event_type, name, callback);
        let id = self.inner.registry.write().insert(record);
        debug!(event_type = %event_type, handler = %id, "Subscribed handler");
        Subscription::new(&self.inner.registry, event_type, id)
    }

    /// Removes every handler registered for `E`, returning how many there were.
    pub fn unsubscribe_all<E: Event>(&self) -> usize {
        self.unsubscribe_all_of(EventType::of::<E>())
    }

    /// Removes every handler registered for `event_type`.
    pub fn unsubscribe_all_of(&self, event_type: EventType) -> usize {
        let removed = self.inner.registry.write().remove_all(&event_type);
        debug!(event_type = %event_type, removed, "Unsubscribed all handlers");
        removed
    }

    /// Returns the number of handlers registered directly for `E`.
    pub fn subscription_count<E: Event>(&self) -> usize {
        self.subscription_count_of(EventType::of::<E>())
    }

    /// Returns the number of handlers registered directly for `event_type`.
    pub fn subscription_count_of(&self, event_type: EventType) -> usize {
        self.inner.registry.read().count(&event_type)
    }

    /// Returns `true` if at least one handler is registered directly for `E`.
    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.subscription_count::<E>() > 0
    }

    /// Returns every type that currently has at least one handler.
    ///
    /// No ordering is guaranteed.
    pub fn active_event_types(&self) -> Vec<EventType> {
        self.inner.registry.read().active_types()
    }

    /// Removes every handler and invalidates the type cache.
    ///
    /// Returns the total number of handlers removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut registry = self.inner.registry.write();
            let removed = registry.clear();
            self.inner.resolver.clear_cache();
            removed
        };
        debug!(removed, "Cleared event bus");
        removed
    }

    // ------------------------------------------------------------------------
    // Posting
    // ------------------------------------------------------------------------

    /// Posts an event, returning the number of handlers it was delivered to.
    pub fn post<E: Event>(&self, event: E) -> usize {
        self.post_boxed(BoxedEvent::new(event))
    }

    /// Posts a possibly missing event. `None` is a no-op returning 0.
    pub fn post_optional(&self, event: Option<BoxedEvent>) -> usize {
        event.map_or(0, |event| self.post_boxed(event))
    }

    /// Posts an already boxed event.
    ///
    /// The returned count is the number of handlers targeted, computed before
    /// any of them runs: a failing handler still counts, and under deferred
    /// delivery the handlers may not have run yet.
    pub fn post_boxed(&self, event: BoxedEvent) -> usize {
        let span = span!(Level::DEBUG, "post", event_name = %event.event_name());
        let _enter = span.enter();

        let (targets, is_dead) = self.snapshot(&event);
        let delivered = targets.len();

        for record in targets {
            self.invoke(&event, record);
        }

        if delivered > 0 {
            trace!(delivered, "Event delivered");
        } else if is_dead {
            debug!("Dead event has no subscribers, dropping");
        } else {
            debug!("Event has no subscribers, posting dead event");
            self.post(DeadEvent::new(self.clone(), event).with_reason(NO_SUBSCRIBERS));
        }

        delivered
    }

    /// Freezes the handlers matching `event`. The registry lock is released
    /// before any handler runs.
    fn snapshot(&self, event: &BoxedEvent) -> (Vec<Arc<HandlerRecord>>, bool) {
        let registry = self.inner.registry.read();
        let include_any = registry.contains(&EventType::any());
        let chain = self.inner.resolver.resolve(&**event, include_any);
        let is_dead = chain.contains(&EventType::of::<DeadEvent>());

        let targets = chain
            .iter()
            .flat_map(|ty| registry.handlers(ty).iter().cloned())
            .collect();
        (targets, is_dead)
    }

    fn invoke(&self, event: &BoxedEvent, record: Arc<HandlerRecord>) {
        match &self.inner.executor {
            None => self.deliver(event, &record),
            Some(executor) => {
                let bus = self.clone();
                let event = event.clone();
                executor.execute(Box::new(move || bus.deliver(&event, &record)));
            }
        }
    }

    /// Runs one handler, forwarding any failure to the exception reporter.
    ///
    /// The reporter is called outside the panic guard.
    fn deliver(&self, event: &BoxedEvent, record: &HandlerRecord) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (record.callback)(&**event)));
        let err = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err,
            Err(payload) => HandlerError::from_panic(payload),
        };

        let context = ExceptionContext {
            event: event.clone(),
            event_type: record.event_type,
            handler: record.info,
            event_bus: self.clone(),
        };
        self.inner.reporter.report(&err, &context);
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Returns `true` if handler invocations go through an executor.
    pub fn is_deferred(&self) -> bool {
        self.inner.executor.is_some()
    }

    /// Returns `true` if both handles refer to the same bus.
    pub fn ptr_eq(&self, other: &EventBus) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the number of type chains currently cached.
    pub fn cached_type_chains(&self) -> usize {
        self.inner.resolver.cached_len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("active_types", &self.inner.registry.read().active_types().len())
            .field("deferred", &self.is_deferred())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`EventBus`] and [`DeferredEventBus`].
#[derive(Default)]
pub struct EventBusBuilder {
    reporter: Option<Arc<dyn ExceptionReporter>>,
    executor: Option<Arc<dyn Executor>>,
}

impl EventBusBuilder {
    /// Sets the sink for handler failures. Defaults to [`LoggingReporter`].
    pub fn exception_reporter(mut self, reporter: impl ExceptionReporter + 'static) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Routes every handler invocation through `executor`.
    pub fn executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Builds the bus. Delivery is deferred only if an executor was set.
    pub fn build(self) -> EventBus {
        EventBus {
            inner: Arc::new(BusInner {
                registry: SharedRegistry::default(),
                resolver: TypeResolver::new(),
                reporter: self.reporter.unwrap_or_else(|| Arc::new(LoggingReporter)),
                executor: self.executor,
            }),
        }
    }

    /// Builds a deferred bus, using [`SpawnExecutor`] if no executor was set.
    pub fn build_deferred(mut self) -> DeferredEventBus {
        if self.executor.is_none() {
            self.executor = Some(Arc::new(SpawnExecutor::new()));
        }
        DeferredEventBus::from_bus(self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::{Order, SpecialOrder};
    use parking_lot::Mutex;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Widget;

    impl Event for Widget {
        fn event_name(&self) -> &'static str {
            "widget"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn panicking_handler(_: &Order) {
        panic!("handler bug");
    }

    fn panicking_reporter(_: &HandlerError, _: &ExceptionContext) {
        panic!("reporter bug");
    }

    fn special(id: u32) -> SpecialOrder {
        SpecialOrder {
            order: Order { id },
        }
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let c = Arc::new(AtomicUsize::new(0));
        (Arc::clone(&c), c)
    }

    #[test]
    fn test_post_reaches_type_and_ancestors() {
        let bus = EventBus::new();
        let (orders, orders_clone) = counter();
        let (specials, specials_clone) = counter();

        bus.subscribe(move |_: &Order| {
            orders_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.subscribe(move |_: &SpecialOrder| {
            specials_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.post(special(1)), 2);
        assert_eq!(orders.load(Ordering::SeqCst), 1);
        assert_eq!(specials.load(Ordering::SeqCst), 1);

        assert_eq!(bus.post(Order { id: 2 }), 1);
        assert_eq!(orders.load(Ordering::SeqCst), 2);
        assert_eq!(specials.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delivery_order_is_type_major_then_insertion() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for label in ["order-1", "order-2"] {
            let log = Arc::clone(&log);
            bus.subscribe(move |_: &Order| log.lock().push(label));
        }
        let log_clone = Arc::clone(&log);
        bus.subscribe(move |_: &SpecialOrder| log_clone.lock().push("special"));

        bus.post(special(1));
        assert_eq!(*log.lock(), vec!["special", "order-1", "order-2"]);
    }

    #[test]
    fn test_same_callback_twice_delivers_twice() {
        let bus = EventBus::new();
        let (count, count_clone) = counter();
        let handler = move |_: &Order| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        };

        let first = bus.subscribe(handler.clone());
        bus.subscribe(handler);

        assert_eq!(bus.post(Order { id: 1 }), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        first.unsubscribe();
        assert_eq!(bus.post(Order { id: 1 }), 1);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_undelivered_event_becomes_dead_event() {
        let bus = EventBus::new();
        let dead = Arc::new(Mutex::new(Vec::new()));
        let dead_clone = Arc::clone(&dead);
        bus.subscribe(move |event: &DeadEvent| {
            dead_clone.lock().push((
                event.event().downcast_ref::<Widget>().is_some(),
                event.reason().map(str::to_owned),
            ));
        });

        assert_eq!(bus.post(Widget), 0);
        assert_eq!(
            *dead.lock(),
            vec![(true, Some(NO_SUBSCRIBERS.to_string()))]
        );
    }

    #[test]
    fn test_dead_event_source_is_the_posting_bus() {
        let bus = EventBus::new();
        let matched = Arc::new(AtomicUsize::new(0));
        let matched_clone = Arc::clone(&matched);
        let bus_clone = bus.clone();
        bus.subscribe(move |event: &DeadEvent| {
            if event.source().ptr_eq(&bus_clone) {
                matched_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        bus.post(Widget);
        assert_eq!(matched.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dead_event_is_never_rewrapped() {
        let bus = EventBus::new();

        // An undeliverable dead event is dropped, not wrapped again.
        let dead = DeadEvent::new(bus.clone(), BoxedEvent::new(Widget));
        assert_eq!(bus.post(dead), 0);

        // Widget -> DeadEvent -> dropped.
        assert_eq!(bus.post(Widget), 0);
        assert_eq!(bus.cached_type_chains(), 2);
    }

    #[test]
    fn test_missing_event_is_noop() {
        let bus = EventBus::new();
        let (dead, dead_clone) = counter();
        bus.subscribe(move |_: &DeadEvent| {
            dead_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.post_optional(None), 0);
        assert_eq!(dead.load(Ordering::SeqCst), 0);
        assert_eq!(bus.cached_type_chains(), 0);
    }

    #[test]
    fn test_catch_all_suppresses_dead_events() {
        let bus = EventBus::new();
        let (any, any_clone) = counter();
        let (dead, dead_clone) = counter();
        bus.subscribe_any(move |_: &dyn Event| {
            any_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.subscribe(move |_: &DeadEvent| {
            dead_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.post(Widget), 1);
        assert_eq!(any.load(Ordering::SeqCst), 1);
        assert_eq!(dead.load(Ordering::SeqCst), 0);

        // Dead events themselves also reach the catch-all.
        assert_eq!(bus.post(DeadEvent::new(bus.clone(), BoxedEvent::new(Widget))), 2);
        assert_eq!(any.load(Ordering::SeqCst), 2);
        assert_eq!(dead.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_catch_all_runs_after_specific_types() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let any_log = Arc::clone(&log);
        bus.subscribe_any(move |_: &dyn Event| any_log.lock().push("any"));
        let order_log = Arc::clone(&log);
        bus.subscribe(move |_: &Order| order_log.lock().push("order"));

        bus.post(special(1));
        assert_eq!(*log.lock(), vec!["order", "any"]);
    }

    #[test]
    fn test_failing_handler_is_isolated_and_reported() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let reports_clone = Arc::clone(&reports);
        let bus = EventBus::builder()
            .exception_reporter(move |err: &HandlerError, ctx: &ExceptionContext| {
                reports_clone
                    .lock()
                    .push((err.is_panic(), ctx.event_type, ctx.handler.id));
            })
            .build();
        let (ran, ran_clone) = counter();

        let failing = bus.subscribe(|_: &SpecialOrder| -> Result<(), &'static str> {
            Err("rejected")
        });
        let panicking = bus.subscribe(panicking_handler);
        bus.subscribe(move |_: &Order| {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.post(special(1)), 3);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(
            *reports.lock(),
            vec![
                (false, EventType::of::<SpecialOrder>(), failing.id()),
                (true, EventType::of::<Order>(), panicking.id()),
            ]
        );
    }

    #[test]
    fn test_panicking_reporter_propagates() {
        let bus = EventBus::builder()
            .exception_reporter(panicking_reporter)
            .build();
        bus.subscribe(|_: &Order| -> Result<(), &'static str> { Err("rejected") });

        let result = panic::catch_unwind(AssertUnwindSafe(|| bus.post(Order { id: 1 })));
        assert!(result.is_err());
    }

    #[test]
    fn test_snapshot_ignores_changes_during_delivery() {
        let bus = EventBus::new();
        let (late, late_clone) = counter();
        let (second, second_clone) = counter();

        let second_sub = Arc::new(Mutex::new(None::<Subscription>));
        let second_sub_clone = Arc::clone(&second_sub);
        let bus_clone = bus.clone();
        bus.subscribe(move |_: &Order| {
            // Removing a snapshotted handler does not prevent its invocation.
            if let Some(sub) = second_sub_clone.lock().as_ref() {
                sub.unsubscribe();
            }
            let late_clone = Arc::clone(&late_clone);
            bus_clone.subscribe(move |_: &Order| {
                late_clone.fetch_add(1, Ordering::SeqCst);
            });
        });
        *second_sub.lock() = Some(bus.subscribe(move |_: &Order| {
            second_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(bus.post(Order { id: 1 }), 2);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(late.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscription_count::<Order>(), 2);
    }

    #[test]
    fn test_reentrant_post() {
        let bus = EventBus::new();
        let (widgets, widgets_clone) = counter();
        let bus_clone = bus.clone();
        bus.subscribe(move |_: &Order| {
            bus_clone.post(Widget);
        });
        bus.subscribe(move |_: &Widget| {
            widgets_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.post(Order { id: 1 }), 1);
        assert_eq!(widgets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_counts_and_active_types() {
        let bus = EventBus::new();
        bus.subscribe(|_: &Order| {});
        bus.subscribe(|_: &Order| {});
        bus.subscribe(|_: &SpecialOrder| {});
        bus.subscribe_any(|_: &dyn Event| {});

        assert_eq!(bus.subscription_count::<Order>(), 2);
        assert_eq!(bus.subscription_count_of(EventType::any()), 1);
        assert!(bus.has_subscribers::<SpecialOrder>());
        assert!(!bus.has_subscribers::<Widget>());

        let active = bus.active_event_types();
        assert_eq!(active.len(), 3);
        assert!(active.contains(&EventType::of::<Order>()));
        assert!(active.contains(&EventType::of::<SpecialOrder>()));
        assert!(active.contains(&EventType::any()));

        assert_eq!(bus.unsubscribe_all::<Order>(), 2);
        assert_eq!(bus.subscription_count::<Order>(), 0);
        assert!(!bus.active_event_types().contains(&EventType::of::<Order>()));
        assert_eq!(bus.unsubscribe_all::<Order>(), 0);
    }

    #[test]
    fn test_clear_resets_registry_and_cache() {
        let bus = EventBus::new();
        let (dead, dead_clone) = counter();
        let sub = bus.subscribe(|_: &Order| {});
        bus.subscribe(|_: &Order| {});
        bus.subscribe(|_: &SpecialOrder| {});

        bus.post(special(1));
        assert!(bus.cached_type_chains() > 0);

        assert_eq!(bus.clear(), 3);
        assert!(bus.active_event_types().is_empty());
        assert_eq!(bus.cached_type_chains(), 0);
        assert!(!sub.unsubscribe());

        bus.subscribe(move |_: &DeadEvent| {
            dead_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.post(Order { id: 1 }), 0);
        assert_eq!(dead.load(Ordering::SeqCst), 1);
    }
}
