pub mod workflow_handlers;
