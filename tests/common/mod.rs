//! Common test helpers: fixture workspaces and the mock language server.

#![allow(dead_code)]

pub mod mock_server;
pub mod temp_workspace;

pub use mock_server::{
    MockReply, MockResponse, MockServerHandle, baseline_reply, connect, connect_baseline,
};
pub use temp_workspace::TestWorkspace;

/// A minimal single-package fixture with a cursor on a cross-file symbol use.
pub const PACKAGE_FIXTURE: &str = r#"//- /Package.swift
// swift-tools-version:5.9
import PackageDescription

let package = Package(name: "Sample", targets: [.target(name: "Sample")])
//- /Sources/Sample/Point.swift
struct Point {
    var x: Int
    var y: Int

    func magnitude() -> Int {
        x * x + y * y
    }
}
//- /Sources/Sample/Main.swift
func run() {
    let p = Point$0(x: 1, y: 2)
    _ = p.magnitude()
}
"#;
