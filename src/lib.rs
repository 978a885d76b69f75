//! ==========================================
//! TOURIST SAFETY ENGINE - ENTRY POINT
//! ==========================================

pub mod assessment;
pub mod config;
pub mod context;
pub mod detectors;
pub mod dispatcher;
pub mod error;
pub mod features;
pub mod fusion;
pub mod geofence;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod store;
pub mod training;
pub mod zone_index;

pub use context::AppContext;
pub use error::{AppError, AppResult};

/// Builds the shared application state and spawns the background
/// Training Scheduler.
///
/// This must be called **exactly once** at process startup. The
/// returned `AppContext` is cloned into every worker thread's
/// `App::app_data` — cloning it is cheap, it only clones `Arc`s.
///
/// Calling this inside a request handler would spin up a fresh, empty
/// store and a second training loop racing the first.
pub fn initialize(config: config::AppConfig) -> AppContext {
    let ctx = AppContext::new(config);
    ctx.training_scheduler.clone().spawn();
    spawn_zone_refresh_loop(&ctx);
    log::info!("tourist safety engine initialized");
    ctx
}

/// Zones reach the Store out-of-band (there is no zone-management
/// endpoint on this surface, matching upstream's direct-seed
/// approach); this loop is what makes a zone change there eventually
/// visible to the Geo-fence Classifier, per spec.md §4.1's "refreshed
/// on zone change".
fn spawn_zone_refresh_loop(ctx: &AppContext) {
    let zones = ctx.zones.clone();
    let store = ctx.store.clone();
    let interval = ctx.config.zone_refresh_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            zones.refresh(&store).await;
        }
    });
}
