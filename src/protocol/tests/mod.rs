mod tests_emit;
