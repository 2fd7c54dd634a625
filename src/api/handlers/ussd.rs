use actix_web::{web, HttpResponse};
use tracing::{error, info};

use crate::core::ussd::{self, UssdReply, UssdRequest};
use crate::AppState;

/// Gateway callback; the reply body is plain text starting with `CON` or `END`.
pub async fn callback(state: web::Data<AppState>, form: web::Form<UssdRequest>) -> HttpResponse {
    let request = form.into_inner();
    info!(session_id = %request.session_id, service_code = %request.service_code, "ussd request");
    let reply = match ussd::respond(state.store.as_ref(), &request).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(session_id = %request.session_id, error = %e, "ussd lookup failed");
            UssdReply::End("Service temporarily unavailable, please try again later".into())
        }
    };
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(reply.render())
}
