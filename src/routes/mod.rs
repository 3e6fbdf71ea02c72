use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};

use crate::AppState;
use crate::error::AppError;
use crate::handlers::review::ReviewResource;
use crate::handlers::tour::TourResource;
use crate::handlers::user::UserResource;
use crate::handlers::{auth, factory, review, tour, user};
use crate::middleware::auth::{
    auth_middleware, require_admin, require_guide_staff, require_reviewer, require_tour_manager,
    require_user_role,
};

pub fn create_router(state: AppState) -> Router {
    // Public tour reads
    let tour_public = Router::new()
        .route("/", get(factory::get_all::<TourResource>))
        .route("/top-5-cheap", get(tour::top_tours))
        .route("/stats", get(tour::tour_stats))
        .route(
            "/tours-within/{distance}/center/{latlng}/unit/{unit}",
            get(tour::tours_within),
        )
        .route("/{id}", get(tour::get_tour));

    // Planning view for staff
    let tour_staff = Router::new()
        .route("/monthly-plan/{year}", get(tour::monthly_plan))
        .layer(middleware::from_fn(require_guide_staff))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Tour management (admin or lead guide)
    let tour_manage = Router::new()
        .route("/", post(tour::create_tour))
        .route("/{id}", patch(tour::update_tour))
        .route("/{id}", delete(factory::delete_one::<TourResource>))
        .layer(middleware::from_fn(require_tour_manager))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Reviews nested under a tour
    let tour_reviews_list = Router::new()
        .route("/{id}/reviews", get(review::list_tour_reviews))
        .layer(middleware::from_fn(require_tour_manager))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let tour_reviews_create = Router::new()
        .route("/{id}/reviews", post(review::create_tour_review))
        .layer(middleware::from_fn(require_user_role))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let tour_routes = tour_public
        .merge(tour_staff)
        .merge(tour_manage)
        .merge(tour_reviews_list)
        .merge(tour_reviews_create);

    // Public auth routes
    let user_public = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login));

    // Signed-in self-service
    let user_me = Router::new()
        .route("/me", get(user::get_me))
        .route("/update-me", patch(user::update_me))
        .route("/delete-me", delete(user::delete_me))
        .route("/update-my-password", patch(auth::update_password))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Admin user management
    let user_admin = Router::new()
        .route("/", get(factory::get_all::<UserResource>))
        .route("/", post(factory::create_one::<UserResource>))
        .route("/{id}", get(factory::get_one::<UserResource>))
        .route("/{id}", patch(factory::update_one::<UserResource>))
        .route("/{id}", delete(factory::delete_one::<UserResource>))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let user_routes = user_public.merge(user_me).merge(user_admin);

    // Cross-tour review listing is a back-office view
    let review_list = Router::new()
        .route("/", get(factory::get_all::<ReviewResource>))
        .layer(middleware::from_fn(require_tour_manager))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let review_create = Router::new()
        .route("/", post(review::create_review))
        .layer(middleware::from_fn(require_user_role))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let review_detail = Router::new()
        .route("/{id}", get(review::get_review))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let review_modify = Router::new()
        .route("/{id}", patch(review::update_review))
        .route("/{id}", delete(review::delete_review))
        .layer(middleware::from_fn(require_reviewer))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let review_routes = review_list
        .merge(review_create)
        .merge(review_detail)
        .merge(review_modify);

    // Combine all routes
    Router::new()
        .nest("/api/v1/tours", tour_routes)
        .nest("/api/v1/users", user_routes)
        .nest("/api/v1/reviews", review_routes)
        .fallback(handle_404)
        .with_state(state)
}

async fn handle_404() -> AppError {
    AppError::NotFound("Can't find the requested URL on this server".to_string())
}
