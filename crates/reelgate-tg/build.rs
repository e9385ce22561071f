fn main() {
    vergen::EmitBuilder::builder()
        .build_timestamp()
        .git_branch()
        .git_sha(false)
        .rustc_semver()
        .cargo_target_triple()
        .emit()
        .unwrap();
}
