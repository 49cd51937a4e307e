fn main() -> anyhow::Result<()> {
    loadmesh::cli::run_cli()
}
