fn main() -> anyhow::Result<()> {
    // Necessary for ESP-IDF; host builds have no sysenv to forward
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();

    println!("cargo:rerun-if-changed=build.rs");

    Ok(())
}
