pub mod forecast_model;
pub mod forecasting_service;
pub mod job_scheduler_service;
pub mod linear_regressor;
pub mod lstm_regressor;
pub mod prediction_store;
pub mod scaler;
pub mod sentiment_service;
pub mod series_loader;
pub mod windower;
