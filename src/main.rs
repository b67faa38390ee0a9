use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod agent;
mod backboard;
mod config;
mod controllers;
mod gateway;
mod http;
mod orchestrator;
mod state;
mod tools;
mod types;

use agent::{PromptStore, Runner, TaskRunner};
use config::Config;
use gateway::EventBroadcaster;
use orchestrator::Swarm;
use state::{AssistantStore, RunStore, TodoStore};
use tools::Registry;

pub struct AppState {
    pub config: Config,
    pub runs: Arc<RunStore>,
    pub events: Arc<EventBroadcaster>,
    pub swarm: Arc<Swarm>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            log::error!("configuration error: {}", err);
            std::process::exit(1);
        }
    };

    let wd = std::env::current_dir()?;
    let prompts = match PromptStore::load(&wd) {
        Ok(prompts) => prompts,
        Err(err) => {
            log::error!("prompt load error: {}", err);
            std::process::exit(1);
        }
    };

    let events = Arc::new(EventBroadcaster::new());
    let runs = Arc::new(RunStore::new());

    let registry = Arc::new(Registry::new());
    tools::builtin::register_builtins(&registry);
    log::info!("registered {} tools", registry.len());

    let client = match backboard::Client::new(
        &cfg.base_url,
        &cfg.backboard_api_key,
        cfg.request_timeout,
    ) {
        Ok(client) => client,
        Err(err) => {
            log::error!("backboard client error: {}", err);
            std::process::exit(1);
        }
    };

    let runner: Arc<dyn TaskRunner> = Arc::new(Runner::new(
        client,
        cfg.clone(),
        registry,
        Arc::new(AssistantStore::new()),
        Arc::new(TodoStore::new()),
        prompts,
        events.clone(),
    ));
    let swarm = Arc::new(Swarm::new(runner, cfg.clone(), Some(events.clone())));

    let state = web::Data::new(AppState {
        config: cfg.clone(),
        runs,
        events,
        swarm,
    });

    let bind_addr = cfg.bind_addr();
    log::info!(
        "listening on {} (advertised as {}), workspace root {}",
        bind_addr,
        cfg.server_url,
        cfg.workspace_root.display()
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(controllers::health::config_routes)
            .configure(controllers::runs::config_routes)
            .service(web::resource("/ws").route(web::get().to(gateway::actix_ws::ws_handler)))
    })
    .bind(bind_addr)?
    .run()
    .await
}
