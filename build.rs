fn main() {
    // Only the ESP-IDF build needs the sysenv passthrough; host builds
    // (tests, fuzzing) have nothing to generate.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
