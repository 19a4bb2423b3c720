use vergen_gitcl::{BuildBuilder, CargoBuilder, Emitter, GitclBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = BuildBuilder::default().build_date(true).build()?;
    let cargo = CargoBuilder::default().target_triple(true).build()?;
    let gitcl = GitclBuilder::default().sha(true).build()?;

    let emitted = Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&cargo)?
        .add_instructions(&gitcl)?
        .emit();

    // git が使えない環境（tarball からのビルドなど）では unknown で埋める
    if emitted.is_err() {
        for key in [
            "VERGEN_BUILD_DATE",
            "VERGEN_CARGO_TARGET_TRIPLE",
            "VERGEN_GIT_SHA",
        ] {
            println!("cargo::rustc-env={key}=unknown");
        }
    }

    Ok(())
}
