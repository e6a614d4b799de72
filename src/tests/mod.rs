// Scenario tests for the framebuffer backend, run against host doubles

mod support;

mod framebuffer_tests;
