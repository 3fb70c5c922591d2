//! # Checkpoint Core
//!
//! Core traits and types for the Checkpoint architecture.
//!
//! Scan processing on a staff device is modelled as a state machine driven by
//! a reducer. The reducer never performs I/O itself: it mutates state in place
//! and returns descriptions of the side effects it wants (a remote submission,
//! a feedback pulse, a display timer). The runtime executes those effects and
//! feeds any resulting actions back into the reducer.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature (e.g. the check-in processor)
//! - **Action**: Every input to a reducer, commands and completion events alike
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected collaborators behind traits
//!
//! ## Example
//!
//! ```ignore
//! use checkpoint_core::*;
//!
//! impl Reducer for TurnstileReducer {
//!     type State = TurnstileState;
//!     type Action = TurnstileAction;
//!     type Environment = TurnstileEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut TurnstileState,
//!         action: TurnstileAction,
//!         env: &TurnstileEnvironment,
//!     ) -> SmallVec<[Effect<TurnstileAction>; 4]> {
//!         match action {
//!             TurnstileAction::Push => {
//!                 state.passes += 1;
//!                 smallvec![Effect::None]
//!             }
//!         }
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - the core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They hold all decision logic and are deterministic given the same clock.
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// 1. Validates the action against the current state
        /// 2. Updates state in place
        /// 3. Returns effect descriptions for the runtime to execute
        ///
        /// Most actions produce at most a handful of effects, so the inline
        /// capacity of four avoids heap allocation on the hot path.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - side effect descriptions
///
/// Effects are values. A reducer returns them, the runtime runs them.
pub mod effect {
    use futures::future::BoxFuture;
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects concurrently
        Parallel(Vec<Effect<Action>>),

        /// Run effects one after another, each to completion
        Sequential(Vec<Effect<Action>>),

        /// Dispatch an action after a delay
        ///
        /// Delays are fire-and-forget timers. Reducers that must ignore a timer
        /// which fires after it became irrelevant should tag the action (for
        /// example with a generation counter) and check the tag on arrival.
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after the delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// If the future yields `Some(action)`, the action is fed back into the reducer.
        Future(BoxFuture<'static, Option<Action>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::None => write!(f, "Effect::None"),
                Self::Parallel(effects) => f.debug_tuple("Effect::Parallel").field(effects).finish(),
                Self::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Self::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Self::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Self>) -> Self {
            Self::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Self>) -> Self {
            Self::Sequential(effects)
        }

        /// Whether this effect does nothing at all
        #[must_use]
        pub fn is_none(&self) -> bool {
            match self {
                Self::None => true,
                Self::Parallel(effects) | Self::Sequential(effects) => {
                    effects.iter().all(Self::is_none)
                },
                Self::Delay { .. } | Self::Future(_) => false,
            }
        }
    }
}

/// Environment module - dependency injection traits
///
/// Reducers read the time through [`environment::Clock`] so rate windows and
/// record timestamps can be driven deterministically in tests.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
