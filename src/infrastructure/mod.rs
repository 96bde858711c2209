// Infrastructure layer - External dependencies and adapters
pub mod chunked_json;
pub mod config;
pub mod graphql_repository;
pub mod http_response;
pub mod push_channel;
pub mod stomp;
