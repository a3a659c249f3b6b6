pub mod fixtures;

#[cfg(test)]
mod service_tests;
#[cfg(test)]
mod transcribe_tests;
