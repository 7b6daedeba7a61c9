use std::process::ExitCode;

fn main() -> ExitCode {
    voxel_world_engine::run()
}
