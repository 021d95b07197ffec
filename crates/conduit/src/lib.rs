pub mod context;
pub mod errors;
pub mod image;
pub mod model_bank;
pub mod model_list;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod runtime;
pub mod streams;
pub mod token_counter;
