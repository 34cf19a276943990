pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod services;
pub mod utils;

use crate::realtime::rooms::RoomRegistry;
use crate::services::{
    conversation_service::ConversationService, message_service::MessageService,
    profile_service::ProfileService,
};
use reqwest::Client;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub conversation_service: ConversationService,
    pub message_service: MessageService,
    pub profile_service: ProfileService,
    pub rooms: RoomRegistry,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let conversation_service = ConversationService::new(pool.clone());
        let message_service = MessageService::new(pool.clone());
        let profile_service =
            ProfileService::new(config.profile_service_url.clone(), http_client);
        let rooms = RoomRegistry::new();

        Self {
            pool,
            conversation_service,
            message_service,
            profile_service,
            rooms,
        }
    }
}
