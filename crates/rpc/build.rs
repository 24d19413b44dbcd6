fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protos = ["proto/amber/v1/api.proto", "proto/amber/v1/follower.proto"];

    std::fs::create_dir_all("src/generated")?;
    tonic_build::configure()
        .build_server(true)
        .build_client(true) // The daemon consumes the follower stream as a client
        .out_dir("src/generated")
        .compile_protos(&protos, &["proto"])?;

    for proto in &protos {
        println!("cargo:rerun-if-changed={}", proto);
    }

    Ok(())
}
