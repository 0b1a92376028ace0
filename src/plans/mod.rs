mod index;
mod record;
mod workflow;

pub use index::{MAX_RECENT_PLANS, PlanIndex};
pub use record::{PlanKind, PlanMatcher, PlanRecord};
pub use workflow::{CreationStage, PlanWorkflow, StageObserver};
