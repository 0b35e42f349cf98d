fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Host builds (tests, simulation) have nothing to generate.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
