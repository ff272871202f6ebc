mod function_exec;
mod graph_basic;
mod layers;
