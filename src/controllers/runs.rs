//! Task submission and run-status lookup.

use crate::types::{Event, EventType};
use crate::AppState;
use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/tasks").route(web::post().to(submit_task)));
    cfg.service(web::resource("/runs/{id}").route(web::get().to(get_run)));
}

#[derive(Debug, Deserialize)]
struct TaskRequest {
    #[serde(default)]
    task: String,
}

#[derive(Debug, Serialize)]
struct TaskResponse {
    run_id: String,
    state: String,
}

/// Accepts a task, spawns the swarm in the background, and returns
/// immediately. The run is bounded by a deadline of ten request timeouts.
async fn submit_task(state: web::Data<AppState>, body: web::Json<TaskRequest>) -> impl Responder {
    let task = body.task.trim().to_string();
    if task.is_empty() {
        return HttpResponse::BadRequest().json(json!({"error": "task is required"}));
    }

    let run_id = state.runs.new_run(&task);
    state.runs.set_running(&run_id);
    log::info!("accepted task as {}", run_id);

    let background = state.clone();
    let spawned_run_id = run_id.clone();
    tokio::spawn(async move {
        let deadline = background.config.request_timeout * 10;
        let outcome =
            tokio::time::timeout(deadline, background.swarm.run(&spawned_run_id, &task)).await;

        let error = match outcome {
            Ok(Ok(summary)) => {
                background.runs.set_completed(&spawned_run_id, &summary);
                log::info!("run {} completed", spawned_run_id);
                return;
            }
            Ok(Err(err)) => err,
            Err(_) => format!("run exceeded deadline of {:?}", deadline),
        };

        log::error!("run {} failed: {}", spawned_run_id, error);
        background.runs.set_failed(&spawned_run_id, &error);
        background.events.emit(
            Event::new(EventType::SwarmFinished)
                .with_run(&spawned_run_id)
                .with_status("failed")
                .with_message(&error),
        );
    });

    HttpResponse::Accepted().json(TaskResponse {
        run_id,
        state: "running".to_string(),
    })
}

async fn get_run(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let run_id = path.into_inner();
    match state.runs.get(&run_id) {
        Some(run) => HttpResponse::Ok().json(run),
        None => HttpResponse::NotFound().json(json!({"error": "run not found"})),
    }
}
