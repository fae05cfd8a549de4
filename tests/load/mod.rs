mod runtime_test;
mod workload_test;
