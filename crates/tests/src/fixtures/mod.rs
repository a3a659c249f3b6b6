pub mod callback_receiver;
pub mod test_app;
