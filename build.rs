fn main() {
    // Only the ESP-IDF build needs the toolchain environment; host builds
    // (tests, fuzzing) compile without embuild.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
